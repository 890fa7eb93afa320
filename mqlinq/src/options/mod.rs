use serde::Deserialize;

/// Options passed in for translation, used throughout the various translation components
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TranslationOptions {
    /// Merge a final projection into the group stage it reads from.
    pub correlated_group_rewrite: bool,
    /// Emit `$match` predicates in the query language where possible instead
    /// of wrapping them in `$expr`.
    pub match_language: bool,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        TranslationOptions {
            correlated_group_rewrite: true,
            match_language: true,
        }
    }
}

impl TranslationOptions {
    pub fn new(correlated_group_rewrite: bool, match_language: bool) -> Self {
        TranslationOptions {
            correlated_group_rewrite,
            match_language,
        }
    }
}

#[cfg(test)]
mod test {
    use super::TranslationOptions;
    use bson::doc;

    #[test]
    fn missing_fields_take_defaults() {
        let options: TranslationOptions =
            bson::from_document(doc! {"match_language": false}).unwrap();
        assert_eq!(TranslationOptions::new(true, false), options);
    }

    #[test]
    fn empty_document_is_default() {
        let options: TranslationOptions = bson::from_document(doc! {}).unwrap();
        assert_eq!(TranslationOptions::default(), options);
    }
}
