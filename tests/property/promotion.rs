use proptest::prelude::*;

use monoc::infer::Kind;
use monoc::infer::kind::promote;

const ALL: [Kind; 15] = [
    Kind::Unknown,
    Kind::Boolean,
    Kind::Integer,
    Kind::Float,
    Kind::Complex,
    Kind::None,
    Kind::String,
    Kind::Bytes,
    Kind::List,
    Kind::Dict,
    Kind::Function,
    Kind::Method,
    Kind::Class,
    Kind::Instance,
    Kind::Module,
];

fn any_kind() -> impl Strategy<Value = Kind> {
    prop::sample::select(ALL.to_vec())
}

fn numeric_kind() -> impl Strategy<Value = Kind> {
    prop::sample::select(vec![Kind::Boolean, Kind::Integer, Kind::Float, Kind::Complex])
}

proptest! {
    #[test]
    fn prop_promote_is_symmetric(a in any_kind(), b in any_kind()) {
        prop_assert_eq!(promote(a, b), promote(b, a));
    }

    #[test]
    fn prop_promote_is_total_on_numbers(a in numeric_kind(), b in numeric_kind()) {
        let joined = promote(a, b).unwrap();
        prop_assert!(joined == a || joined == b);
        prop_assert_eq!(promote(joined, a), Some(joined));
        prop_assert_eq!(promote(joined, b), Some(joined));
    }

    #[test]
    fn prop_promote_is_associative(a in numeric_kind(), b in numeric_kind(), c in numeric_kind()) {
        let left = promote(promote(a, b).unwrap(), c);
        let right = promote(a, promote(b, c).unwrap());
        prop_assert_eq!(left, right);
    }

    #[test]
    fn prop_non_numeric_never_promotes(a in any_kind(), b in any_kind()) {
        if !a.is_numeric() || !b.is_numeric() {
            prop_assert_eq!(promote(a, b), None);
        }
    }
}
