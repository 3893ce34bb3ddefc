//! Fetch specification: which attributes the service returns per record.

use std::collections::HashSet;

/// Which attributes to retrieve for each record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Fetch {
    /// Reference shells only (`_ref`, `_type`, `_refObjectName`)
    #[default]
    False,
    /// Every attribute; records come back hydrated
    True,
    /// Only the named attributes
    Fields(Vec<String>),
}

impl Fetch {
    /// Parse a comma-separated field list. Blank entries and duplicates are dropped.
    pub fn fields(spec: &str) -> Self {
        let mut seen = HashSet::new();
        let fields = spec
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .filter(|f| seen.insert(f.to_string()))
            .map(String::from)
            .collect::<Vec<_>>();

        if fields.is_empty() {
            Fetch::False
        } else {
            Fetch::Fields(fields)
        }
    }

    /// Value of the `fetch` query parameter.
    pub fn as_param(&self) -> String {
        match self {
            Fetch::False => "false".to_string(),
            Fetch::True => "true".to_string(),
            Fetch::Fields(fields) => fields.join(","),
        }
    }

    /// Whether records fetched with this spec are fully hydrated.
    pub fn is_full(&self) -> bool {
        matches!(self, Fetch::True)
    }

    /// Attribute names to keep on returned records; `None` keeps everything.
    pub(crate) fn retained(&self) -> Option<HashSet<String>> {
        match self {
            Fetch::True => None,
            Fetch::False => Some(HashSet::new()),
            Fetch::Fields(fields) => Some(fields.iter().cloned().collect()),
        }
    }
}

impl From<bool> for Fetch {
    fn from(value: bool) -> Self {
        if value { Fetch::True } else { Fetch::False }
    }
}

impl From<&str> for Fetch {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" => Fetch::True,
            "false" => Fetch::False,
            _ => Fetch::fields(value),
        }
    }
}

impl From<String> for Fetch {
    fn from(value: String) -> Self {
        Fetch::from(value.as_str())
    }
}

impl From<Vec<&str>> for Fetch {
    fn from(value: Vec<&str>) -> Self {
        Fetch::fields(&value.join(","))
    }
}

impl From<Vec<String>> for Fetch {
    fn from(value: Vec<String>) -> Self {
        Fetch::fields(&value.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Fetch::from(true), "true")]
    #[case(Fetch::from(false), "false")]
    #[case(Fetch::from("TRUE"), "true")]
    #[case(Fetch::from("Owner,State"), "Owner,State")]
    #[case(Fetch::from(" Owner , State,,Owner "), "Owner,State")]
    #[case(Fetch::from(vec!["Name", "FormattedID"]), "Name,FormattedID")]
    #[case(Fetch::from(""), "false")]
    fn test_fetch_param(#[case] fetch: Fetch, #[case] expected: &str) {
        assert_eq!(fetch.as_param(), expected);
    }

    #[test]
    fn test_retained_sets() {
        assert!(Fetch::True.retained().is_none());
        assert!(Fetch::False.retained().unwrap().is_empty());

        let retained = Fetch::fields("Owner,State,Fabulote").retained().unwrap();
        assert_eq!(retained.len(), 3);
        assert!(retained.contains("Fabulote"));
    }

    #[test]
    fn test_only_true_is_full() {
        assert!(Fetch::True.is_full());
        assert!(!Fetch::False.is_full());
        assert!(!Fetch::fields("Name").is_full());
    }
}
