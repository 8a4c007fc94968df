//! Parameter placeholder rewriting.

/// Rewrites `@pN` placeholders into PostgreSQL's `$N+1`.
///
/// Parameters are bound positionally in registration order, so `@p0`
/// becomes `$1`. Text without placeholders is returned unchanged.
#[must_use]
pub fn to_positional(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find("@p") {
        out.push_str(&rest[..at]);
        let tail = &rest[at + 2..];
        let digits = tail.chars().take_while(char::is_ascii_digit).count();
        match tail[..digits].parse::<usize>() {
            Ok(index) => {
                out.push('$');
                out.push_str(&(index + 1).to_string());
            }
            Err(_) => out.push_str("@p"),
        }
        rest = &tail[digits..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_in_order() {
        assert_eq!(
            to_positional("SELECT * FROM t t0 WHERE t0.a=@p0 AND t0.b=@p1 OR t0.a=@p0;"),
            "SELECT * FROM t t0 WHERE t0.a=$1 AND t0.b=$2 OR t0.a=$1;"
        );
    }

    #[test]
    fn multi_digit_and_plain_text() {
        assert_eq!(to_positional("@p10,@p9"), "$11,$10");
        assert_eq!(to_positional("no params"), "no params");
        assert_eq!(to_positional("a@pb"), "a@pb");
    }
}
