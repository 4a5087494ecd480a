//! Proof-key (PKCE) verifier and challenge generation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use super::PkceMethod;

/// PKCE code verifier and challenge
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
    pub method: PkceMethod,
}

/// Generate PKCE code verifier and challenge
pub fn generate_pkce(method: PkceMethod) -> Pkce {
    // Use two UUIDs (16 bytes each) to get 32 random bytes
    let uuid1 = uuid::Uuid::new_v4();
    let uuid2 = uuid::Uuid::new_v4();
    let mut verifier_bytes = [0u8; 32];
    verifier_bytes[..16].copy_from_slice(uuid1.as_bytes());
    verifier_bytes[16..].copy_from_slice(uuid2.as_bytes());
    let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

    Pkce {
        challenge: challenge_for(&verifier, method),
        verifier,
        method,
    }
}

fn challenge_for(verifier: &str, method: PkceMethod) -> String {
    match method {
        PkceMethod::S256 => {
            let mut hasher = Sha256::new();
            hasher.update(verifier.as_bytes());
            URL_SAFE_NO_PAD.encode(hasher.finalize())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkce_generation() {
        let pkce = generate_pkce(PkceMethod::S256);
        // 32 bytes base64url without padding = 43 chars
        assert_eq!(pkce.verifier.len(), 43);
        assert_eq!(pkce.challenge.len(), 43);
        assert_ne!(pkce.verifier, pkce.challenge);
        assert_ne!(generate_pkce(PkceMethod::S256).verifier, pkce.verifier);
    }

    #[test]
    fn test_s256_challenge_matches_rfc7636_vector() {
        let challenge = challenge_for(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk",
            PkceMethod::S256,
        );
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8ZQWy7hLpJ2Ha3Q");
    }
}
