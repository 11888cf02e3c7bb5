// # Update URL Templates
//
// Vendor update URLs are stored as templates over a closed set of
// placeholders. Parsing rejects anything outside that set, so untrusted
// operator input can never reach general string interpolation.
//
// ## Grammar
//
// - `{hostname}`, `{domain}`, `{token}`, `{ip}`, `{id}`: substituted
// - `{{` and `}}`: literal braces
// - anything else inside braces, or an unbalanced brace: rejected
//
// Substituted values are percent-encoded. Rendering returns a `RenderedUrl`
// that keeps the token out of `Debug`/`Display`.

use secrecy::{ExposeSecret, SecretString};
use std::net::IpAddr;

use crate::error::{Error, Result};

/// Placeholders a template may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    Hostname,
    Domain,
    Token,
    Ip,
    Id,
}

impl Placeholder {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "hostname" => Some(Self::Hostname),
            "domain" => Some(Self::Domain),
            "token" => Some(Self::Token),
            "ip" => Some(Self::Ip),
            "id" => Some(Self::Id),
            _ => None,
        }
    }

    /// The name used inside braces
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hostname => "hostname",
            Self::Domain => "domain",
            Self::Token => "token",
            Self::Ip => "ip",
            Self::Id => "id",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Placeholder),
}

/// Placeholders every update template must contain
pub const REQUIRED_PLACEHOLDERS: &[Placeholder] = &[
    Placeholder::Hostname,
    Placeholder::Domain,
    Placeholder::Token,
    Placeholder::Ip,
];

/// A parsed update URL template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    segments: Vec<Segment>,
}

/// Values substituted into a template for one update call
pub struct TemplateValues<'a> {
    pub hostname: &'a str,
    pub domain: &'a str,
    pub token: &'a SecretString,
    pub ip: IpAddr,
    pub id: &'a str,
}

impl UrlTemplate {
    /// Parse a template, checking the placeholder set and required fields
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for n in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if !closed {
                        return Err(Error::template("unterminated placeholder"));
                    }
                    let field = Placeholder::parse(&name)
                        .ok_or_else(|| Error::template(format!("unknown placeholder {{{name}}}")))?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                '}' => return Err(Error::template("unmatched '}'")),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let parsed = Self { segments };
        let missing: Vec<String> = REQUIRED_PLACEHOLDERS
            .iter()
            .filter(|required| !parsed.uses(**required))
            .map(|required| format!("{{{}}}", required.name()))
            .collect();
        if !missing.is_empty() {
            return Err(Error::template(format!(
                "missing required placeholder {}",
                missing.join(", ")
            )));
        }
        Ok(parsed)
    }

    /// Whether the template references a placeholder
    pub fn uses(&self, placeholder: Placeholder) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Field(p) if *p == placeholder))
    }

    /// Literal text before the first placeholder
    ///
    /// Scheme and host checks run against this prefix; a template whose host
    /// depends on a placeholder has no usable prefix.
    pub fn literal_prefix(&self) -> &str {
        match self.segments.first() {
            Some(Segment::Literal(text)) => text,
            _ => "",
        }
    }

    /// Substitute the values into the template
    pub fn render(&self, values: &TemplateValues<'_>) -> RenderedUrl {
        let mut url = String::new();
        let mut token_encoded = None;

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => url.push_str(text),
                Segment::Field(Placeholder::Hostname) => {
                    url.push_str(&urlencoding::encode(values.hostname))
                }
                Segment::Field(Placeholder::Domain) => {
                    url.push_str(&urlencoding::encode(values.domain))
                }
                Segment::Field(Placeholder::Id) => url.push_str(&urlencoding::encode(values.id)),
                Segment::Field(Placeholder::Ip) => url.push_str(&values.ip.to_string()),
                Segment::Field(Placeholder::Token) => {
                    let encoded = urlencoding::encode(values.token.expose_secret()).into_owned();
                    url.push_str(&encoded);
                    token_encoded = Some(encoded);
                }
            }
        }

        let redacted = match token_encoded {
            Some(ref token) if !token.is_empty() => url.replace(token.as_str(), "<REDACTED>"),
            _ => url.clone(),
        };

        RenderedUrl {
            url: SecretString::new(url),
            redacted,
        }
    }
}

/// A fully substituted update URL
///
/// The URL embeds the plaintext token, so it is only reachable through
/// [`RenderedUrl::expose`]; formatting prints the redacted form.
pub struct RenderedUrl {
    url: SecretString,
    redacted: String,
}

impl RenderedUrl {
    /// The real URL, for the HTTP client only
    pub fn expose(&self) -> &str {
        self.url.expose_secret()
    }

    /// The URL with the token replaced, safe for logs
    pub fn redacted(&self) -> &str {
        &self.redacted
    }
}

impl std::fmt::Debug for RenderedUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RenderedUrl").field(&self.redacted).finish()
    }
}

impl std::fmt::Display for RenderedUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.redacted)
    }
}
