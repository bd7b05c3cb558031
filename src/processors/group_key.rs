use crate::error::Result;
use crate::models::observation::string_column;
use crate::store::Table;
use crate::utils::constants::{
    AGGREGATE_SUFFIX, COL_MUNICIPALITY_NAME, COL_STATE_NAME, PROCESSED_PREFIX,
};
use arrow::array::Array;

/// Lowercase, fold the accented vowels used in Mexican place names and drop
/// periods. Pure: equal input always yields equal output.
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter_map(|c| match c {
            'á' => Some('a'),
            'é' => Some('e'),
            'í' => Some('i'),
            'ó' => Some('o'),
            'ú' => Some('u'),
            // decomposed input: bare combining acute accent
            '.' | '\u{0301}' => None,
            c => Some(c),
        })
        .collect()
}

/// Key for a state/municipality pair, e.g. `yucatan_merida`
pub fn group_key(state: &str, municipality: &str) -> String {
    normalize(&format!("{}_{}", state, municipality))
}

/// Output dataset for a group key
pub fn dataset_name(key: &str) -> String {
    format!("{}/{}{}", PROCESSED_PREFIX, key, AGGREGATE_SUFFIX)
}

/// Group key of every row. Null names count as empty strings.
pub fn row_group_keys(table: &Table) -> Result<Vec<String>> {
    let states = string_column(table, COL_STATE_NAME)?;
    let municipalities = string_column(table, COL_MUNICIPALITY_NAME)?;

    let text = |values: &arrow::array::StringArray, i: usize| -> String {
        // Null names key as "", not as the literal text "nan"
        if values.is_null(i) {
            String::new()
        } else {
            values.value(i).to_string()
        }
    };

    Ok((0..table.num_rows())
        .map(|i| group_key(&text(&states, i), &text(&municipalities, i)))
        .collect())
}
