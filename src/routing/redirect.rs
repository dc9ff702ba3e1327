//! Redirect convention: a non-owner answers with an Error reply whose message
//! is this prefix followed by the owner's canonical address.

pub const REDIRECT_PREFIX: &str = "redirect to node ";

pub fn redirect_message(owner: &str) -> String {
    format!("{}{}", REDIRECT_PREFIX, owner)
}

/// Owner address named by a redirect message, if `message` is one.
pub fn parse_redirect(message: &str) -> Option<&str> {
    message
        .strip_prefix(REDIRECT_PREFIX)
        .map(str::trim)
        .filter(|owner| !owner.is_empty())
}
