use citadel_store::StoreError;

/// Failure taxonomy for social-graph operations. `Display` text doubles as
/// the human-readable message of the structured outcome returned to callers.
#[derive(Debug, thiserror::Error)]
pub enum SocialError {
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("username '{0}' is already taken")]
    UsernameTaken(String),
    #[error("invalid username: {0}")]
    InvalidUsername(String),
    #[error("operation cannot target yourself")]
    SelfReference,
    #[error("already friends with {0}")]
    AlreadyFriends(String),
    #[error("friend request to {0} is already pending")]
    DuplicateRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("credentials rejected")]
    BadCredentials,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SocialError {
    /// Expected rejections callers branch on, as opposed to store faults.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}
