//! Category identifiers for task routing.
//!
//! Every task names the [`Category`] whose worker group executes it. Groups
//! are created lazily the first time a category is hired into or pushed to,
//! so the set of categories is open: small integers, string keys and enums
//! all work.
//!
//! ```rust
//! use assembly_line::Category;
//!
//! #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
//! enum Stage {
//!     Greet,
//!     Print,
//! }
//!
//! fn label<K: Category>(k: &K) -> String {
//!     assembly_line::core::category::label(k)
//! }
//!
//! assert_eq!(label(&Stage::Print), "Print");
//! assert_eq!(label(&7u32), "7");
//! assert_eq!(label(&"io"), "\"io\"");
//! ```

use std::fmt::Debug;
use std::hash::Hash;

/// Identifier of a worker group.
///
/// Implemented for every type that is `Clone + Eq + Hash + Debug + Send +
/// Sync + 'static`. Categories are cloned into messages and used as map keys
/// inside the coordinator.
pub trait Category: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> Category for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// Human-readable label used in thread names, logs and errors.
pub fn label<K: Category>(category: &K) -> String {
    format!("{:?}", category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum Kind {
        Fetch,
        Parse,
    }

    fn assert_category<K: Category>() {}

    #[test]
    fn test_common_types_are_categories() {
        assert_category::<u8>();
        assert_category::<usize>();
        assert_category::<&'static str>();
        assert_category::<String>();
        assert_category::<Kind>();
        assert_category::<(u16, Kind)>();
    }

    #[test]
    fn test_label() {
        assert_eq!(label(&Kind::Fetch), "Fetch");
        assert_eq!(label(&3usize), "3");
        assert_eq!(label(&String::from("db")), "\"db\"");
    }

    #[test]
    fn test_category_as_key() {
        let mut map = HashMap::new();
        map.insert(Kind::Fetch, 1);
        map.insert(Kind::Parse, 2);
        assert_eq!(map.get(&Kind::Parse), Some(&2));
    }
}
