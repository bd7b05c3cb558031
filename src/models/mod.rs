pub mod observation;

pub use observation::{
    date_process_field, observations_to_table, with_date_process, Observation,
};
