use engram_tokens::TokenCounter;
use proptest::prelude::*;

proptest! {
    #[test]
    fn count_is_bounded(s in ".{0,400}") {
        let counter = TokenCounter::default();
        let count = counter.count(&s);
        prop_assert!(count < usize::MAX);
    }

    #[test]
    fn cached_equals_uncached(s in ".{0,200}") {
        let counter = TokenCounter::default();
        prop_assert_eq!(counter.count(&s), counter.count_cached(&s));
    }

    #[test]
    fn subadditivity(a in ".{0,100}", b in ".{0,100}") {
        let counter = TokenCounter::default();
        let combined = format!("{}{}", a, b);
        prop_assert!(
            counter.count(&combined) <= counter.count(&a) + counter.count(&b) + 1,
            "token count of a concatenation exceeds the sum of its parts"
        );
    }
}
