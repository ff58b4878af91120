//! 库所、迁移、令牌类型与状态的强类型标识符.
//!
//! 每种标识以短前缀显示 (`p3`, `t0`, `k1`, `s42`)，日志与错误信息中可直接区分.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::net::index_vec::Idx;

macro_rules! net_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// The value written to state-space files.
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(self, f)
            }
        }

        impl Idx for $name {
            fn index(self) -> usize {
                self.0 as usize
            }

            fn from_usize(idx: usize) -> Self {
                Self(idx as u32)
            }
        }
    };
}

net_id!(PlaceId, "p");
net_id!(TransitionId, "t");
net_id!(TokenId, "k");
net_id!(
    /// Dense id of an explored state, assigned on first discovery.
    StateId,
    "s"
);

impl StateId {
    /// The state exploration starts from.
    pub const INITIAL: StateId = StateId(0);

    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }
}
