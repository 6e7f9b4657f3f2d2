use rand::Rng;
use std::fmt;

const SUFFIX_LEN: usize = 7;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque identifier addressing one chat channel.
///
/// Shaped `web-<unix millis>-<7 base36 chars>`. Carries no authentication weight.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(format!("web-{}", time_prefixed_id()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Random suffix, enough to tell sessions apart in logs
    pub fn short(&self) -> &str {
        self.0.rsplit('-').next().unwrap_or(&self.0)
    }
}

/// `<unix millis>-<7 base36 chars>`, unique with overwhelming probability
pub(crate) fn time_prefixed_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();

    format!("{}-{}", millis, suffix)
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
