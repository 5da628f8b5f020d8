use engram_core::traits::TagPayload;
use engram_tags::{is_valid, normalise_payload, parse_hierarchy};
use proptest::prelude::*;

proptest! {
    /// Whatever the extractor returns, every surviving tag matches the
    /// storage pattern.
    #[test]
    fn surviving_tags_are_always_valid(raw in proptest::collection::vec(".{0,24}", 0..12)) {
        let payload = TagPayload::List(raw);
        for tag in normalise_payload(&payload, 4) {
            prop_assert!(is_valid(&tag, 4), "survivor failed validation: {tag}");
            prop_assert!(parse_hierarchy(&tag).is_some());
        }
    }

    /// Valid tags round-trip through hierarchy parsing.
    #[test]
    fn hierarchy_reassembles(
        root in "[a-z0-9]{1,8}",
        rest in proptest::collection::vec("[a-z0-9-]{1,8}", 0..3),
    ) {
        let mut tag = root;
        for level in &rest {
            tag.push(':');
            tag.push_str(level);
        }
        let h = parse_hierarchy(&tag).expect("constructed tag is valid");
        prop_assert_eq!(h.levels.join(":"), tag);
        prop_assert_eq!(h.depth, rest.len() + 1);
    }
}
