use rand::Rng;

use crate::error::EngineError;
use crate::repository::ReservationStore;

const PNR_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const PNR_LEN: usize = 6;
const MAX_ATTEMPTS: usize = 8;

pub fn random_code() -> String {
    let mut rng = rand::thread_rng();
    (0..PNR_LEN)
        .map(|_| PNR_ALPHABET[rng.gen_range(0..PNR_ALPHABET.len())] as char)
        .collect()
}

/// Generate a human-facing reservation code that no existing reservation
/// carries. The store's unique index remains the backstop for the window
/// between check and insert.
pub async fn generate_unique(store: &dyn ReservationStore) -> Result<String, EngineError> {
    for _ in 0..MAX_ATTEMPTS {
        let code = random_code();
        if !store.reservation_code_exists(&code).await? {
            return Ok(code);
        }
    }
    Err(EngineError::StoreUnavailable(
        "could not generate an unused reservation code".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_chars_from_the_alphabet() {
        for _ in 0..100 {
            let code = random_code();
            assert_eq!(code.len(), PNR_LEN);
            assert!(code.bytes().all(|b| PNR_ALPHABET.contains(&b)));
        }
    }
}
