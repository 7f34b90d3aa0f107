use pkce_handshake::pkce::{compute_challenge, PkceEngine, VERIFIER_ALPHABET};
use pkce_handshake::random::{OsRandomSource, SequenceSource};
use pkce_handshake::PkceError;
use std::collections::HashSet;
use std::sync::Arc;

// indices into VERIFIER_ALPHABET
const FIXED_INDICES: [usize; 96] = [
    48, 23, 17, 51, 56, 43, 26, 53, 38, 32, 53, 47, 53, 37, 23, 58, 0, 16, 31, 56, 32, 41, 49, 57, 53, 61, 46, 20,
    25, 56, 15, 54, 26, 3, 18, 57, 50, 46, 13, 23, 20, 23, 61, 7, 14, 51, 0, 14, 37, 39, 46, 8, 32, 1, 23, 31, 30,
    20, 29, 46, 30, 45, 59, 61, 27, 37, 29, 20, 49, 35, 8, 30, 46, 57, 5, 41, 45, 0, 29, 35, 46, 4, 28, 60, 21, 22,
    41, 6, 36, 13, 59, 61, 38, 34, 56, 41,
];

#[test]
fn fixed_index_sequence_yields_known_challenge() {
    let src = Arc::new(SequenceSource::new(FIXED_INDICES.to_vec()));
    let engine = PkceEngine::with_default_length(src.clone());
    let verifier = engine.generate_verifier().expect("generate verifier");

    assert_eq!(src.consumed(), 96);
    let expected: String = FIXED_INDICES
        .iter()
        .map(|&i| char::from(VERIFIER_ALPHABET[i]))
        .collect();
    assert_eq!(verifier.secret(), expected);
    assert_eq!(
        verifier.challenge().as_str(),
        "5l-F55mJw3lGVNbXYyTsIytpxW_SI9qaGATCNUemCmw"
    );
    // re-derivable from the raw bytes at any time
    assert_eq!(
        compute_challenge(verifier.secret().as_bytes()),
        verifier.challenge()
    );
}

#[test]
fn generated_verifiers_do_not_collide() {
    let engine = PkceEngine::with_default_length(Arc::new(OsRandomSource::new()));
    let mut seen = HashSet::new();
    for _ in 0..10_000 {
        let v = engine.generate_verifier().expect("generate");
        assert_eq!(v.len(), 96);
        assert!(seen.insert(v.secret().to_owned()), "verifier collision");
    }
}

#[test]
fn generation_fails_whole_when_entropy_runs_out() {
    let src = Arc::new(SequenceSource::new(FIXED_INDICES[..50].to_vec()));
    let engine = PkceEngine::with_default_length(src);
    match engine.generate_verifier() {
        Err(PkceError::EntropyUnavailable(_)) => {}
        other => panic!("expected EntropyUnavailable, got {:?}", other),
    }
}

#[test]
fn concurrent_generation_keeps_verifiers_intact() {
    let engine = PkceEngine::with_default_length(Arc::new(OsRandomSource::new()));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                (0..200)
                    .map(|_| engine.generate_verifier().expect("generate"))
                    .all(|v| {
                        v.len() == 96 && v.secret().bytes().all(|b| VERIFIER_ALPHABET.contains(&b))
                    })
            })
        })
        .collect();
    for h in handles {
        assert!(h.join().expect("thread"));
    }
}
