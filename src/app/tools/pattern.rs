use regex::Regex;

/// First match of `pattern` in `text`: capture group 1 when the pattern has one,
/// otherwise the whole match. Empty when nothing matches or the pattern does not compile.
pub fn first_match(pattern: &str, text: &str) -> String {
    match Regex::new(pattern) {
        Ok(re) => first_match_with(&re, text),
        Err(_) => String::new(),
    }
}

pub fn first_match_with(re: &Regex, text: &str) -> String {
    let Some(caps) = re.captures(text) else {
        return String::new();
    };
    let found = if caps.len() > 1 { caps.get(1) } else { caps.get(0) };
    found.map(|m| m.as_str().to_string()).unwrap_or_default()
}
