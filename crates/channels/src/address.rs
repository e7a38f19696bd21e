/// Turn a caller-supplied phone number into a network address.
///
/// Whitespace, dashes and a leading `+` are dropped and `suffix` is
/// appended. Input that already carries a domain (`@`) is passed through.
pub fn qualify_recipient(number: &str, suffix: &str) -> String {
    let trimmed = number.trim();
    if trimmed.contains('@') {
        return trimmed.to_string();
    }
    let digits: String = trimmed
        .trim_start_matches('+')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    format!("{digits}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_suffix() {
        assert_eq!(
            qualify_recipient("5511999998888", "@c.us"),
            "5511999998888@c.us"
        );
    }

    #[test]
    fn strips_plus_and_separators() {
        assert_eq!(
            qualify_recipient(" +55 11 99999-8888 ", "@c.us"),
            "5511999998888@c.us"
        );
    }

    #[test]
    fn keeps_qualified_address() {
        assert_eq!(
            qualify_recipient("123-456@g.us", "@c.us"),
            "123-456@g.us"
        );
    }
}
