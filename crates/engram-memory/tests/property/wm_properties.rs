//! Property: working memory never exceeds its token budget, whatever the
//! sequence of adds, removes, and forced evictions.

use chrono::Utc;
use engram_memory::{WmAdd, WorkingMemory};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Add { id: i64, tokens: usize, access: i64 },
    Remove { id: i64 },
    Evict { needed: usize },
}

fn op_strategy(max_tokens: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..32i64, 1..(max_tokens * 2), 0..20i64)
            .prop_map(|(id, tokens, access)| Op::Add { id, tokens, access }),
        (0..32i64).prop_map(|id| Op::Remove { id }),
        (0..(max_tokens * 2)).prop_map(|needed| Op::Evict { needed }),
    ]
}

proptest! {
    #[test]
    fn token_budget_holds_under_any_sequence(
        ops in proptest::collection::vec(op_strategy(200), 1..60)
    ) {
        let wm = WorkingMemory::new(200);
        for op in ops {
            match op {
                Op::Add { id, tokens, access } => {
                    // Oversize adds are rejected; both outcomes are fine,
                    // the budget must hold either way.
                    let _ = wm.add(WmAdd {
                        node_id: id,
                        content: format!("node {id}"),
                        token_count: tokens,
                        access_count: access,
                        last_accessed: Utc::now(),
                        from_recall: false,
                    });
                }
                Op::Remove { id } => {
                    wm.remove(id);
                }
                Op::Evict { needed } => {
                    wm.evict_to_make_space(needed);
                }
            }
            prop_assert!(
                wm.token_count() <= wm.max_tokens(),
                "budget exceeded: {} > {}",
                wm.token_count(),
                wm.max_tokens()
            );
        }
    }

    /// Token accounting matches the sum over resident entries.
    #[test]
    fn token_count_is_consistent(
        ids in proptest::collection::vec(0..16i64, 1..30)
    ) {
        let wm = WorkingMemory::new(500);
        for id in ids {
            let _ = wm.add(WmAdd {
                node_id: id,
                content: "x".into(),
                token_count: 25,
                access_count: 0,
                last_accessed: Utc::now(),
                from_recall: false,
            });
        }
        prop_assert_eq!(wm.token_count(), wm.node_count() * 25);
    }
}
