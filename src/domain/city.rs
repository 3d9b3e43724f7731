//! Best-effort extraction of a city name from a free-form Brazilian address,
//! e.g. `"Rua A, 100 - Centro, Campinas - SP, 13083-970"` yields `"Campinas"`.

const COUNTRY_NAMES: [&str; 2] = ["Brasil", "Brazil"];

const STATE_ABBREVIATIONS: [&str; 27] = [
    "AC", "AL", "AP", "AM", "BA", "CE", "DF", "ES", "GO", "MA", "MT", "MS", "MG", "PA", "PB", "PR",
    "PE", "PI", "RJ", "RN", "RS", "RO", "RR", "SC", "SP", "SE", "TO",
];

const INVALID_CITY_CHARS: &[char] = &[
    '@', '#', '$', '%', '^', '&', '*', '(', ')', '+', '=', '[', ']', '{', '}', '|', '\\', ':', ';',
    '"', '\'', '<', '>', ',', '.', '?', '/',
];

const NON_CITY_WORDS: [&str; 17] = [
    "rua", "avenida", "av", "r", "n", "s", "l", "o", "e", "norte", "sul", "leste", "oeste",
    "centro", "bairro", "distrito", "zona",
];

const CITY_PREFIXES: [&str; 3] = ["Cidade de ", "Município de ", "Municipio de "];

const LOWERCASE_WORDS: [&str; 18] = [
    "de", "da", "do", "das", "dos", "e", "em", "na", "no", "nas", "nos", "para", "por", "com",
    "sem", "sob", "sobre", "entre",
];

const CITY_STATE_SEPARATOR: &str = " - ";

/// Returns an empty string when no part of the address plausibly names a city.
pub fn extract_city(location: &str) -> String {
    let location = location.trim();
    if location.is_empty() {
        return String::new();
    }

    let location = collapse_whitespace(strip_country_suffix(location));

    let parts: Vec<&str> = location.split(',').collect();
    if parts.len() < 2 {
        return String::new();
    }

    for (index, part) in parts.iter().enumerate().rev() {
        let part = part.trim();
        if part.is_empty() || is_postal_code(part) {
            continue;
        }

        if let Some(city) = split_city_state(part) {
            return clean_city_name(city);
        }

        if is_state_abbreviation(part) || !is_valid_city_name(part) {
            continue;
        }

        // The first part is the street.
        if index > 0 {
            return clean_city_name(part);
        }
    }

    String::new()
}

/// Drops trailing country names written as their own address part, so
/// "Avenida Brasil" or "Brasilia" stay intact.
fn strip_country_suffix(location: &str) -> &str {
    let mut rest = location.trim_end();
    loop {
        let Some(before) = COUNTRY_NAMES
            .iter()
            .find_map(|name| strip_suffix_ignore_case(rest, name))
        else {
            return rest;
        };

        let before = before.trim_end();
        if !(before.is_empty() || before.ends_with(',') || before.ends_with('-')) {
            return rest;
        }
        rest = before.trim_end_matches(|c: char| c == ',' || c == '-' || c.is_whitespace());
    }
}

fn strip_suffix_ignore_case<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    let split = value.len().checked_sub(suffix.len())?;
    if !value.is_char_boundary(split) || !value[split..].eq_ignore_ascii_case(suffix) {
        return None;
    }
    Some(&value[..split])
}

fn split_city_state(part: &str) -> Option<&str> {
    let mut segments = part.split(CITY_STATE_SEPARATOR);
    let city = segments.next()?.trim();
    let state = segments.next()?.trim();
    (is_state_abbreviation(state) && is_valid_city_name(city)).then_some(city)
}

/// CEP: five or eight digits once hyphens and spaces are removed.
pub fn is_postal_code(value: &str) -> bool {
    let digits: String = value.chars().filter(|c| *c != '-' && *c != ' ').collect();
    matches!(digits.len(), 5 | 8) && digits.chars().all(|c| c.is_ascii_digit())
}

pub fn is_state_abbreviation(value: &str) -> bool {
    STATE_ABBREVIATIONS
        .iter()
        .any(|state| state.eq_ignore_ascii_case(value))
}

pub fn is_valid_city_name(value: &str) -> bool {
    let length = value.chars().count();
    if length < 3 {
        return false;
    }
    if value.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    if value.contains(INVALID_CITY_CHARS) {
        return false;
    }
    if length <= 5 && value == value.to_uppercase() {
        return false;
    }
    let lowered = value.to_lowercase();
    !NON_CITY_WORDS.iter().any(|word| *word == lowered)
}

pub fn clean_city_name(value: &str) -> String {
    let collapsed = collapse_whitespace(value);

    let name = match collapsed.rsplit_once(CITY_STATE_SEPARATOR) {
        Some((city, state)) if is_state_abbreviation(state.trim()) => city.trim(),
        _ => collapsed.as_str(),
    };
    let name = name.trim_end_matches('-').trim_end();

    let name = CITY_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(*prefix))
        .unwrap_or(name);

    name.split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_word(word: &str) -> String {
    let lowered = word.to_lowercase();
    if LOWERCASE_WORDS.contains(&lowered.as_str()) {
        return lowered;
    }

    let mut chars = lowered.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
