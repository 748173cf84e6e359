//! Name converters used to assemble identifiers from name chains.

/// A strategy for turning a name (or a joined run of names) into part of an
/// identifier.
///
/// Whole converters (`Hash`, `HashAndRandom` and `Counter`) bound the length
/// of their output: they append a disambiguating value and, when the result
/// would not fit, keep the two ends of the input and drop its middle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameConverter {
    Straight,
    CutVowels,
    SingleChar,
    Hash,
    HashAndRandom,
    Counter,
}

impl NameConverter {
    pub fn converts_whole(self) -> bool {
        matches!(
            self,
            NameConverter::Hash | NameConverter::HashAndRandom | NameConverter::Counter
        )
    }

    pub fn apply(self, name: &str, separator: char, max_size: usize, counter: u32) -> String {
        match self {
            NameConverter::Straight => name.to_string(),
            NameConverter::CutVowels => cut_vowels(name),
            NameConverter::SingleChar => name.chars().take(1).collect(),
            NameConverter::Hash => {
                let value = format!("{}x{:x}", separator, string_hash(name));
                fit_with_value(name, &value, max_size)
            }
            NameConverter::HashAndRandom => {
                let value = format!(
                    "{}x{:x}{}r{:x}",
                    separator,
                    string_hash(name),
                    separator,
                    rand::random::<u32>()
                );
                fit_with_value(name, &value, max_size)
            }
            NameConverter::Counter => {
                let value = format!("{}{}", separator, counter);
                fit_with_value(name, &value, max_size)
            }
        }
    }
}

/// Converters for the first, middle and last positions of a name chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConverters {
    pub first: NameConverter,
    pub middle: NameConverter,
    pub last: NameConverter,
}

impl ChainConverters {
    pub const fn new(first: NameConverter, middle: NameConverter, last: NameConverter) -> Self {
        Self {
            first,
            middle,
            last,
        }
    }

    pub const fn uniform(converter: NameConverter) -> Self {
        Self::new(converter, converter, converter)
    }

    /// Every segment verbatim.
    pub const fn straight() -> Self {
        Self::uniform(NameConverter::Straight)
    }

    /// The whole chain joined and suffixed with the attempt counter.
    pub const fn counter() -> Self {
        Self::uniform(NameConverter::Counter)
    }

    /// Segments joined with `separator`, converters applied as described on
    /// [`NameConverter`]. Adjacent positions sharing a converter are joined
    /// before a whole converter runs over them.
    pub(crate) fn assemble(
        &self,
        segments: &[String],
        separator: char,
        max_size: usize,
        counter: u32,
    ) -> String {
        let Some((first, rest)) = segments.split_first() else {
            return String::new();
        };

        let mut positions: Vec<Position> = Vec::with_capacity(3);
        positions.push(Position::pending(self.first, first.clone()));
        if let Some((last, middle)) = rest.split_last() {
            if !middle.is_empty() {
                let position = if self.middle.converts_whole() {
                    Position::pending(self.middle, join(middle.iter().map(String::as_str), separator))
                } else {
                    let converted: Vec<String> = middle
                        .iter()
                        .map(|segment| self.middle.apply(segment, separator, max_size, counter))
                        .collect();
                    Position {
                        converter: self.middle,
                        text: join(converted.iter().map(String::as_str), separator),
                        converted: true,
                    }
                };
                positions.push(position);
            }
            positions.push(Position::pending(self.last, last.clone()));
        }

        let mut parts: Vec<String> = Vec::with_capacity(positions.len());
        let mut index = 0;
        while index < positions.len() {
            let position = &positions[index];
            let mut end = index + 1;
            if position.converted {
                parts.push(position.text.clone());
            } else if position.converter.converts_whole() {
                while end < positions.len() && positions[end].converter == position.converter {
                    end += 1;
                }
                let joined = join(positions[index..end].iter().map(|p| p.text.as_str()), separator);
                parts.push(position.converter.apply(&joined, separator, max_size, counter));
            } else {
                parts.push(position.converter.apply(&position.text, separator, max_size, counter));
            }
            index = end;
        }

        join(parts.iter().map(String::as_str), separator)
    }
}

struct Position {
    converter: NameConverter,
    text: String,
    converted: bool,
}

impl Position {
    fn pending(converter: NameConverter, text: String) -> Self {
        Self {
            converter,
            text,
            converted: false,
        }
    }
}

fn join<'a>(pieces: impl Iterator<Item = &'a str>, separator: char) -> String {
    let mut out = String::new();
    for (i, piece) in pieces.enumerate() {
        if i > 0 {
            out.push(separator);
        }
        out.push_str(piece);
    }
    out
}

/// Append `value` to `name`, keeping both ends of `name` when the result
/// would exceed `max_size`.
fn fit_with_value(name: &str, value: &str, max_size: usize) -> String {
    let name_len = name.chars().count();
    let value_len = value.chars().count();
    if name_len + value_len <= max_size {
        return format!("{}{}", name, value);
    }

    let available = name_len.min(max_size).saturating_sub(value_len);
    let head = available / 2 + available % 2;
    let tail = available / 2;
    let mut out: String = name.chars().take(head).collect();
    out.extend(name.chars().skip(name_len - tail));
    out.push_str(value);
    out
}

/// Drop every run of vowels that follows a letter.
fn cut_vowels(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut after_letter = false;
    for c in name.chars() {
        let vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u');
        if vowel && after_letter {
            continue;
        }
        out.push(c);
        after_letter = c.is_ascii_lowercase();
    }
    out
}

/// 32-bit polynomial string hash over UTF-16 code units (`h = 31 * h + c`).
fn string_hash(name: &str) -> u32 {
    name.encode_utf16()
        .fold(0u32, |hash, unit| hash.wrapping_mul(31).wrapping_add(u32::from(unit)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_straight_joins_verbatim() {
        let converters = ChainConverters::straight();
        let segments = chain(&["mydb", "orders", "items", "1"]);
        assert_eq!(converters.assemble(&segments, '_', 30, 1), "mydb_orders_items_1");
    }

    #[test]
    fn test_counter_fits_short_names() {
        let converters = ChainConverters::counter();
        let segments = chain(&["a", "b", "c"]);
        assert_eq!(converters.assemble(&segments, '_', 30, 3), "a_b_c_3");
    }

    #[test]
    fn test_symmetric_truncation() {
        let out = NameConverter::Counter.apply("abcdefghij", '_', 8, 1);
        assert_eq!(out, "abchij_1");
        assert_eq!(out.len(), 8);

        let out = NameConverter::Counter.apply("abcdefghij", '_', 9, 12);
        assert_eq!(out, "abchij_12");
    }

    #[test]
    fn test_exact_fit_is_not_truncated() {
        assert_eq!(NameConverter::Counter.apply("abcdef", '_', 8, 1), "abcdef_1");
    }

    #[test]
    fn test_cut_vowels() {
        assert_eq!(NameConverter::CutVowels.apply("customer_address", '_', 63, 1), "cstmr_addrss");
        assert_eq!(NameConverter::CutVowels.apply("aeiou", '_', 63, 1), "a");
    }

    #[test]
    fn test_single_char() {
        assert_eq!(NameConverter::SingleChar.apply("orders", '_', 63, 1), "o");
        assert_eq!(NameConverter::SingleChar.apply("", '_', 63, 1), "");
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("ab"), 97 * 31 + 98);
        assert_eq!(NameConverter::Hash.apply("ab", '_', 63, 1), format!("ab_x{:x}", 97 * 31 + 98));
    }

    #[test]
    fn test_hash_and_random_bounds_length() {
        let name = "x".repeat(100);
        let out = NameConverter::HashAndRandom.apply(&name, '_', 40, 1);
        assert!(out.len() <= 40);
        assert!(out.contains("_r"));
    }

    #[test]
    fn test_whole_middle_is_joined_before_conversion() {
        let converters = ChainConverters::new(
            NameConverter::Straight,
            NameConverter::Hash,
            NameConverter::Straight,
        );
        let segments = chain(&["db", "very", "long", "path", "leaf"]);
        let out = converters.assemble(&segments, '_', 63, 1);
        let middle_hash = format!("{:x}", string_hash("very_long_path"));
        assert_eq!(out, format!("db_very_long_path_x{}_leaf", middle_hash));
    }

    #[test]
    fn test_non_whole_middle_is_converted_per_segment() {
        let converters = ChainConverters::new(
            NameConverter::Straight,
            NameConverter::SingleChar,
            NameConverter::Straight,
        );
        let segments = chain(&["orders", "items", "details", "price"]);
        assert_eq!(converters.assemble(&segments, '_', 63, 1), "orders_i_d_price");
    }
}
