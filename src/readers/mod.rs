pub mod aux_reader;
pub mod payload_reader;
pub mod remote_source;

pub use aux_reader::AuxiliaryReader;
pub use payload_reader::decode_payload;
pub use remote_source::RemoteSource;
