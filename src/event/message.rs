use std::borrow::Cow;
use std::fmt;

/// Log message payload.
///
/// `Parameterized` messages are formatted on the consumer thread, which
/// keeps the substitution work off the producer's publish path.
#[derive(Clone, PartialEq, Eq)]
pub enum Message {
    Simple(Cow<'static, str>),
    Parameterized {
        pattern: Cow<'static, str>,
        params: Vec<String>,
    },
}

impl Message {
    pub fn parameterized(pattern: impl Into<Cow<'static, str>>, params: Vec<String>) -> Self {
        Message::Parameterized {
            pattern: pattern.into(),
            params,
        }
    }

    /// Text with every `{}` replaced by the next parameter. Surplus
    /// placeholders are kept verbatim, surplus parameters are ignored.
    pub fn formatted(&self) -> Cow<'_, str> {
        match self {
            Message::Simple(text) => Cow::Borrowed(text.as_ref()),
            Message::Parameterized { pattern, params } if params.is_empty() => {
                Cow::Borrowed(pattern.as_ref())
            }
            Message::Parameterized { pattern, params } => {
                let extra: usize = params.iter().map(String::len).sum();
                let mut out = String::with_capacity(pattern.len() + extra);
                let mut params = params.iter();
                let mut rest = pattern.as_ref();
                while let Some(pos) = rest.find("{}") {
                    out.push_str(&rest[..pos]);
                    match params.next() {
                        Some(param) => out.push_str(param),
                        None => out.push_str("{}"),
                    }
                    rest = &rest[pos + 2..];
                }
                out.push_str(rest);
                Cow::Owned(out)
            }
        }
    }

    /// Unformatted pattern (or the text of a simple message)
    pub fn pattern(&self) -> &str {
        match self {
            Message::Simple(text) => text.as_ref(),
            Message::Parameterized { pattern, .. } => pattern.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pattern().is_empty()
    }
}

impl Default for Message {
    fn default() -> Self {
        Message::Simple(Cow::Borrowed(""))
    }
}

impl From<&'static str> for Message {
    fn from(text: &'static str) -> Self {
        Message::Simple(Cow::Borrowed(text))
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Simple(Cow::Owned(text))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.formatted())
    }
}
