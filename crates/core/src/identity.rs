use serde::{Deserialize, Serialize};

use crate::ids::UserSub;

/// An authenticated caller. Credential verification happens upstream; the
/// engine only ever sees the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub sub: UserSub,
    pub display_name: String,
}

impl Identity {
    pub fn new(sub: impl Into<UserSub>, display_name: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            display_name: display_name.into(),
        }
    }

    pub fn is(&self, sub: &UserSub) -> bool {
        &self.sub == sub
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_matches_own_sub_only() {
        let alice = Identity::new("u-alice", "Alice");
        assert!(alice.is(&UserSub::from("u-alice")));
        assert!(!alice.is(&UserSub::from("u-bob")));
    }
}
