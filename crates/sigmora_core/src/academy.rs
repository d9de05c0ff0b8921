//! crates/sigmora_core/src/academy.rs
//!
//! Academy codes: the short identifier a subscriber types to join a creator.

use rand::Rng;

pub const ACADEMY_CODE_LEN: usize = 6;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Draws a random code. Uniqueness is not checked here: the credential store's
/// unique index rejects collisions and the caller draws again.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ACADEMY_CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Codes are matched case-insensitively by upper-casing the input.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn is_valid_code(code: &str) -> bool {
    code.len() == ACADEMY_CODE_LEN
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_codes_are_six_uppercase_alphanumerics() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let code = generate_code(&mut rng);
            assert!(is_valid_code(&code), "bad code {code}");
        }
    }

    #[test]
    fn seeded_generation_is_deterministic() {
        let a = generate_code(&mut StdRng::seed_from_u64(7));
        let b = generate_code(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn lookup_input_is_upper_cased() {
        assert_eq!(normalize_code(" ab12cd "), "AB12CD");
        assert!(!is_valid_code("ab12cd"));
        assert!(!is_valid_code("AB12C"));
    }
}
