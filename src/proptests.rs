//! Property-Based Tests for the Registry
//!
//! Checks that lookups keep "absent", "registered without targets" and
//! "registered with targets" apart for arbitrary names and target lists,
//! and that a rejected duplicate never disturbs the stored entry.
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib proptests
//! ```

use proptest::prelude::*;

use crate::registry::{Registry, RegistryError, TargetEndpoint, WebhookName};

fn arb_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}"
}

fn arb_targets() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("https://[a-z]{1,8}\\.example/[a-z]{0,8}", 0..5)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn endpoints(targets: &[String]) -> Vec<TargetEndpoint> {
    targets.iter().map(|t| TargetEndpoint::from(t.as_str())).collect()
}

proptest! {
    #[test]
    fn prop_lookup_matches_what_was_set(
        name in arb_name(),
        other in arb_name(),
        targets in arb_targets(),
    ) {
        runtime().block_on(async {
            let registry = Registry::new();
            registry
                .set(WebhookName::new(name.clone()).unwrap(), endpoints(&targets), false)
                .await
                .unwrap();

            let found = registry.get(&name).await;
            prop_assert!(found.is_some());
            let found = found.unwrap();
            let expected = endpoints(&targets);
            prop_assert_eq!(found.as_ref(), expected.as_slice());

            if other != name {
                prop_assert!(registry.get(&other).await.is_none());
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_duplicate_never_overwrites(
        name in arb_name(),
        first in arb_targets(),
        second in arb_targets(),
    ) {
        runtime().block_on(async {
            let registry = Registry::new();
            let key = WebhookName::new(name.clone()).unwrap();
            registry.set(key.clone(), endpoints(&first), false).await.unwrap();

            let result = registry.set(key, endpoints(&second), false).await;
            prop_assert_eq!(result, Err(RegistryError::DuplicateName(name.clone())));

            let found = registry.get(&name).await.unwrap();
            let expected = endpoints(&first);
            prop_assert_eq!(found.as_ref(), expected.as_slice());
            Ok(())
        })?;
    }
}
