use crate::table_ref::TableRef;
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// Normalize one name segment: canonical decomposition, lower case, and every
/// character outside `[0-9a-z_$]` replaced by `separator`.
///
/// Normalization never fails and `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(segment: &str, separator: char) -> String {
    segment
        .nfd()
        .flat_map(char::to_lowercase)
        .map(|c| {
            if c.is_ascii_digit() || c.is_ascii_lowercase() || c == '_' || c == '$' {
                c
            } else {
                separator
            }
        })
        .collect()
}

/// Ordered, normalized name segments an identifier is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameChain {
    separator: char,
    segments: Vec<String>,
}

impl NameChain {
    pub fn new(separator: char) -> Self {
        Self {
            separator,
            segments: Vec::new(),
        }
    }

    pub fn push(&mut self, segment: &str) {
        self.segments.push(normalize(segment, self.separator));
    }

    /// Append the path of `table_ref`, root first.
    ///
    /// A run of array dimensions collapses into the field it belongs to as
    /// `<field><dimension separator><dimension>`.
    pub fn push_table_ref(&mut self, table_ref: &TableRef, array_dimension_separator: char) {
        let Some(mut parent) = table_ref.parent() else {
            return;
        };

        let name = if table_ref.is_in_array() {
            while parent.is_in_array() {
                match parent.parent() {
                    Some(grand_parent) => parent = grand_parent,
                    None => break,
                }
            }
            let name = format!(
                "{}{}{}",
                parent.name(),
                array_dimension_separator,
                table_ref.array_dimension()
            );
            match parent.parent() {
                Some(grand_parent) => parent = grand_parent,
                None => {
                    self.push(&name);
                    return;
                }
            }
            name
        } else {
            table_ref.name().to_string()
        };

        self.push_table_ref(parent, array_dimension_separator);
        self.push(&name);
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for NameChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.segments.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Hello World", '_'), "hello_world");
        assert_eq!(normalize("Café", '_'), "cafe_");
        assert_eq!(normalize("a.b-c$d", '_'), "a_b_c$d");
        assert_eq!(normalize("", '_'), "");
    }

    #[test]
    fn test_table_ref_expansion() {
        let mut chain = NameChain::new('_');
        chain.push("collecti");
        let table_ref = TableRef::root()
            .child("object")
            .child("array")
            .array_child(2)
            .child("object");
        chain.push_table_ref(&table_ref, '$');
        assert_eq!(chain.segments(), &["collecti", "object", "array$2", "object"]);
    }

    #[test]
    fn test_consecutive_dimensions_collapse() {
        let mut chain = NameChain::new('_');
        let table_ref = TableRef::root().child("m").array_child(2).array_child(3);
        chain.push_table_ref(&table_ref, '$');
        assert_eq!(chain.segments(), &["m$3"]);
    }

    #[test]
    fn test_root_adds_nothing() {
        let mut chain = NameChain::new('_');
        chain.push_table_ref(&TableRef::root(), '$');
        assert!(chain.is_empty());
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(segment in "\\PC{0,40}") {
            let once = normalize(&segment, '_');
            prop_assert_eq!(normalize(&once, '_'), once.clone());
            prop_assert!(once.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase() || c == '_' || c == '$'));
        }
    }
}
