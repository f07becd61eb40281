//! Property tests for the cell graph and cancellation registry.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use deckhand_cli::domain::{CancellationRegistry, Derived, Var, batch};
use proptest::prelude::*;

proptest! {
    #[test]
    fn derived_always_matches_inputs(writes in proptest::collection::vec((any::<bool>(), -50i32..50), 0..40)) {
        let a = Var::new(0);
        let b = Var::new(0);
        let (ra, rb) = (a.clone(), b.clone());
        let sum = Derived::new(vec![a.source(), b.source()], move || ra.get() + rb.get());
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        sum.on_change(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut changes = 0;
        for (left, value) in writes {
            let before = sum.get();
            if left { a.set(value); } else { b.set(value); }
            prop_assert_eq!(sum.get(), a.get() + b.get());
            if sum.get() != before {
                changes += 1;
            }
        }
        prop_assert_eq!(notified.load(Ordering::SeqCst), changes);
    }

    #[test]
    fn batch_notifies_at_most_once(values in proptest::collection::vec(-50i32..50, 1..10)) {
        let a = Var::new(0);
        let ra = a.clone();
        let doubled = Derived::new(vec![a.source()], move || ra.get() * 2);
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        doubled.on_change(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let last = *values.last().unwrap();
        batch(|| {
            for v in &values {
                a.set(*v);
            }
        });

        prop_assert!(notified.load(Ordering::SeqCst) <= 1);
        prop_assert_eq!(doubled.get(), last * 2);
    }

    #[test]
    fn cancel_all_before_spares_pivot_and_newer(count in 1usize..20, pivot in 0usize..20) {
        let pivot = pivot % count;
        let registry = CancellationRegistry::default();
        let tokens: Vec<_> = (0..count).map(|_| registry.create()).collect();

        registry.cancel_all_before(&tokens[pivot]).expect("own token");

        for (i, token) in tokens.iter().enumerate() {
            prop_assert_eq!(token.is_canceled(), i < pivot);
        }
    }
}
