pub const OOB_SENTINEL: [u8; 4] = [0xff; 4];

pub fn is_connectionless(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == OOB_SENTINEL
}

pub fn out_of_band(text: &str) -> Vec<u8> {
    out_of_band_data(text.as_bytes())
}

pub fn out_of_band_data(payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + payload.len());
    data.extend_from_slice(&OOB_SENTINEL);
    data.extend_from_slice(payload);
    data
}

/// First line of a connectionless payload, after the sentinel.
pub fn command_line(data: &[u8]) -> String {
    let body = data.get(4..).unwrap_or_default();
    let end = body
        .iter()
        .position(|&b| b == b'\n' || b == 0)
        .unwrap_or(body.len());
    String::from_utf8_lossy(&body[..end]).into_owned()
}

/// Remainder of the payload after the first line, up to a terminator.
pub fn trailing_text(data: &[u8]) -> String {
    let body = data.get(4..).unwrap_or_default();
    let Some(start) = body.iter().position(|&b| b == b'\n') else {
        return String::new();
    };
    let rest = &body[start + 1..];
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    String::from_utf8_lossy(&rest[..end]).into_owned()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    tokens: Vec<String>,
}

impl Args {
    pub fn tokenize(line: &str) -> Self {
        let mut tokens = Vec::new();
        let mut chars = line.chars().peekable();

        loop {
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            let Some(&first) = chars.peek() else {
                break;
            };

            let mut token = String::new();
            if first == '"' {
                chars.next();
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    token.push(c);
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    token.push(c);
                    chars.next();
                }
            }
            tokens.push(token);
        }

        Self { tokens }
    }

    pub fn argc(&self) -> usize {
        self.tokens.len()
    }

    pub fn argv(&self, index: usize) -> &str {
        self.tokens.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn command(&self) -> &str {
        self.argv(0)
    }

    /// All arguments from `start` joined by single spaces.
    pub fn args_from(&self, start: usize) -> String {
        self.tokens.get(start..).unwrap_or_default().join(" ")
    }
}

/// Leading integer of a token, zero when absent.
pub fn atoi(text: &str) -> i32 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        value = (value * 10 + (b - b'0') as i64).min(i64::from(i32::MAX) + 1);
    }
    let value = if negative { -value } else { value };
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_quoted_arguments() {
        let args = Args::tokenize("connect \"\\name\\player one\\rate\\25000\"");
        assert_eq!(args.argc(), 2);
        assert_eq!(args.command(), "connect");
        assert_eq!(args.argv(1), "\\name\\player one\\rate\\25000");
        assert_eq!(args.argv(5), "");
    }

    #[test]
    fn command_line_stops_at_newline() {
        let data = out_of_band("print\nServer is full.\n");
        assert!(is_connectionless(&data));
        assert_eq!(command_line(&data), "print");
        assert_eq!(trailing_text(&data), "Server is full.\n");
    }

    #[test]
    fn atoi_matches_c_semantics() {
        assert_eq!(atoi("1234"), 1234);
        assert_eq!(atoi("-77xyz"), -77);
        assert_eq!(atoi(""), 0);
        assert_eq!(atoi("abc"), 0);
        assert_eq!(atoi("99999999999"), i32::MAX);
    }
}
