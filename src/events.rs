use std::borrow::Cow;
use std::fmt;

/// One notification line from the LMS CLI, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Player the notification is about, when the server prefixed one.
    pub player_id: Option<String>,
    pub query: String,
    pub param: String,
    /// URL-decoded remainder of the line.
    pub payload: String,
}

impl RawEvent {
    /// Parse one line such as `aa%3Abb%3Acc%3Add%3Aee%3Aff playlist newsong Song%20Title 3`.
    ///
    /// The leading token is taken as a player id when it decodes to something
    /// containing `:`; otherwise the line starts directly with the query.
    /// Lines with fewer than three tokens return `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            return None;
        }

        let first = decode(tokens[0]);
        let (player_id, rest) = if first.contains(':') {
            (Some(first.into_owned()), &tokens[1..])
        } else {
            (None, &tokens[..])
        };

        if rest.len() < 2 {
            return None;
        }

        Some(Self {
            player_id,
            query: decode(rest[0]).into_owned(),
            param: decode(rest[1]).into_owned(),
            payload: decode(&rest[2..].join(" ")).into_owned(),
        })
    }

    /// The only notification the sync reacts to.
    pub fn is_new_song(&self) -> bool {
        self.query == "playlist" && self.param == "newsong"
    }
}

impl fmt::Display for RawEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.query, self.param)?;
        if !self.payload.is_empty() {
            write!(f, " {}", self.payload)?;
        }
        Ok(())
    }
}

fn decode(token: &str) -> Cow<'_, str> {
    match urlencoding::decode(token) {
        Ok(decoded) => decoded,
        Err(_) => Cow::Owned(
            String::from_utf8_lossy(&urlencoding::decode_binary(token.as_bytes())).into_owned(),
        ),
    }
}
