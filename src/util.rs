//! Small text helpers shared by the page controllers.

/// Naive English pluralizer: `count == 1` keeps the word, anything else
/// (including zero and negative counts) appends an `s`.
pub fn pluralize(word: &str, count: i64) -> String {
    if count == 1 {
        return word.to_string();
    }
    format!("{word}s")
}

/// English ordinal suffix for a day of the month (`1st`, `2nd`, `11th`, `23rd`).
pub fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}
