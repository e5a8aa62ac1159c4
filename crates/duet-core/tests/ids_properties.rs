//! Property-based tests for conversation identifiers
//!
//! Both parties compute the conversation id independently, so it must not
//! depend on who computes it:
//!
//! 1. **Order independence**: id(a, b) == id(b, a)
//! 2. **Injectivity on ordered pairs**: distinct pairs of well-formed ids
//!    never collide

use duet_core::{ConversationId, UserId};
use proptest::prelude::*;

fn user_id() -> impl Strategy<Value = UserId> {
    "[a-z0-9]{1,16}".prop_map(UserId::new)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_conversation_id_order_independent(a in user_id(), b in user_id()) {
        prop_assert_eq!(
            ConversationId::for_participants(&a, &b),
            ConversationId::for_participants(&b, &a)
        );
    }

    #[test]
    fn prop_conversation_id_starts_with_smaller_id(a in user_id(), b in user_id()) {
        let id = ConversationId::for_participants(&a, &b);
        let smaller = std::cmp::min(&a, &b);
        let prefix = format!("{smaller}{}", ConversationId::SEPARATOR);
        prop_assert!(id.as_str().starts_with(&prefix));
    }

    #[test]
    fn prop_distinct_pairs_distinct_ids(
        a in user_id(),
        b in user_id(),
        c in user_id(),
        d in user_id(),
    ) {
        let mut first = [a.clone(), b.clone()];
        let mut second = [c.clone(), d.clone()];
        first.sort();
        second.sort();
        prop_assume!(first != second);

        prop_assert_ne!(
            ConversationId::for_participants(&a, &b),
            ConversationId::for_participants(&c, &d)
        );
    }

    #[test]
    fn prop_well_formed_pairs_never_collide(
        a in "[ab_/]{0,4}",
        b in "[ab_/]{0,4}",
        c in "[ab_/]{0,4}",
        d in "[ab_/]{0,4}",
    ) {
        let [a, b, c, d] = [a, b, c, d].map(UserId::new);
        let mut first = [a.clone(), b.clone()];
        let mut second = [c.clone(), d.clone()];
        first.sort();
        second.sort();
        prop_assume!(first != second);

        let collide = ConversationId::for_participants(&a, &b)
            == ConversationId::for_participants(&c, &d);
        if collide {
            prop_assert!(
                ![&a, &b, &c, &d].iter().all(|user| user.is_well_formed()),
                "well-formed pairs collided"
            );
        }
    }
}
