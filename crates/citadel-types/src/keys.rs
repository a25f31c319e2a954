//! Canonical store keys. Every component addresses the store through these
//! builders so that all backends agree on the key space.

/// Separator between the two usernames in a thread key.
pub const THREAD_SEPARATOR: char = ':';

pub fn user_key(username: &str) -> String {
    format!("users/{}", username.to_lowercase())
}

/// Credential records are owned by the AuthProvider, never by the core.
pub fn creds_key(username: &str) -> String {
    format!("creds/{}", username.to_lowercase())
}

/// Canonical DM thread key: lowercase both usernames, sort lexicographically,
/// join with the fixed separator. Both participants derive the identical key
/// regardless of argument order.
pub fn thread_key(a: &str, b: &str) -> String {
    let mut a = a.to_lowercase();
    let mut b = b.to_lowercase();
    if b < a {
        std::mem::swap(&mut a, &mut b);
    }
    format!("dms/{a}{THREAD_SEPARATOR}{b}")
}

/// Parse the two participants back out of a thread key.
pub fn thread_participants(key: &str) -> Option<(&str, &str)> {
    key.strip_prefix("dms/")?.split_once(THREAD_SEPARATOR)
}

pub fn channel_key(bastion_id: &str, channel_id: &str) -> String {
    format!("bastion_msgs/{bastion_id}/{channel_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_key_is_symmetric() {
        assert_eq!(thread_key("alice", "bob"), thread_key("bob", "alice"));
        assert_eq!(thread_key("Alice", "BOB"), thread_key("bob", "alice"));
        assert_eq!(thread_key("alice", "bob"), "dms/alice:bob");
    }

    #[test]
    fn thread_participants_round_trip() {
        let key = thread_key("zoe", "alice");
        assert_eq!(thread_participants(&key), Some(("alice", "zoe")));
        assert_eq!(thread_participants("users/alice"), None);
    }

    #[test]
    fn user_key_lowercases() {
        assert_eq!(user_key("Alice"), "users/alice");
    }
}
