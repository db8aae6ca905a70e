//! Content signatures for timelines and posts
//!
//! Owners sign what they serve; receivers check the signature against the
//! public key the authenticator holds for the author and record the result
//! in the `verified` flag. Unsigned content is never marked verified.

use skein_core::{Post, Timeline};

use crate::{Authenticator, KeyPair, PublicKey};

/// Sign every post and the timeline itself
pub fn sign_timeline(timeline: &mut Timeline, keys: &KeyPair) {
    let signature = keys.sign(&timeline.signing_bytes());
    timeline.signature = Some(signature.to_vec());
}

pub fn sign_post(post: &mut Post, keys: &KeyPair) {
    let signature = keys.sign(&post.signing_bytes());
    post.signature = Some(signature.to_vec());
}

/// Check a timeline signature and set `verified` accordingly
pub fn verify_timeline(timeline: &mut Timeline, key: &PublicKey) -> bool {
    timeline.verified = match &timeline.signature {
        Some(sig) => key.verify(&timeline.signing_bytes(), sig),
        None => false,
    };
    timeline.verified
}

/// Check a post signature and set `verified` accordingly
pub fn verify_post(post: &mut Post, key: &PublicKey) -> bool {
    post.verified = match &post.signature {
        Some(sig) => key.verify(&post.signing_bytes(), sig),
        None => false,
    };
    post.verified
}

/// Verify content received from the overlay, looking up author keys
/// through the authenticator. Unknown authors leave content unverified.
pub fn verify_timeline_with(auth: &dyn Authenticator, timeline: &mut Timeline) -> bool {
    match auth.public_key(&timeline.username) {
        Some(key) => verify_timeline(timeline, &key),
        None => {
            timeline.verified = false;
            false
        }
    }
}

pub fn verify_post_with(auth: &dyn Authenticator, post: &mut Post) -> bool {
    match auth.public_key(&post.author) {
        Some(key) => verify_post(post, &key),
        None => {
            post.verified = false;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalAuthority;

    #[test]
    fn test_signed_timeline_verifies() {
        let keys = KeyPair::generate();
        let mut timeline = Timeline::new("alice");
        timeline.add_post("hello");
        sign_timeline(&mut timeline, &keys);

        assert!(verify_timeline(&mut timeline, &keys.public_key()));
        assert!(timeline.verified);
    }

    #[test]
    fn test_tampered_timeline_fails() {
        let keys = KeyPair::generate();
        let mut timeline = Timeline::new("alice");
        timeline.add_post("hello");
        sign_timeline(&mut timeline, &keys);

        timeline.username = "mallory".into();
        assert!(!verify_timeline(&mut timeline, &keys.public_key()));
        assert!(!timeline.verified);
    }

    #[test]
    fn test_unsigned_post_is_unverified() {
        let keys = KeyPair::generate();
        let mut post = Post::new(1, "alice", "hi");
        post.verified = true;
        assert!(!verify_post(&mut post, &keys.public_key()));
        assert!(!post.verified);
    }

    #[test]
    fn test_verify_through_authenticator() {
        let auth = LocalAuthority::new();
        let keys = auth.register("alice", "pw").unwrap();

        let mut post = Post::new(1, "alice", "hi");
        sign_post(&mut post, &keys);
        assert!(verify_post_with(&auth, &mut post));

        let mut stranger = Post::new(1, "bob", "hi");
        sign_post(&mut stranger, &keys);
        assert!(!verify_post_with(&auth, &mut stranger));
    }

    #[test]
    fn test_wrong_key_fails() {
        let mut post = Post::new(3, "alice", "content");
        sign_post(&mut post, &KeyPair::generate());
        assert!(!verify_post(&mut post, &KeyPair::generate().public_key()));
    }
}
