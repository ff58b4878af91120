//! # Petri 网模型（只读能力）
//!
//! 设库所集合 `P`、迁移集合 `T` 与令牌类型集合 `K`。输入、输出与抑制映射
//! `Pre, Post, Inh ∈ ℕ^{|P|×|T|×|K|}` 按库所行存储。对任意标识 `M`：
//!
//! * 迁移 `t` **结构可激发** 当且仅当：
//!   1. `∀p, k: M[p, k] ≥ Pre[p, t, k]`；
//!   2. `∀p, k: Inh[p, t, k] > 0 ⇒ M[p, k] < Inh[p, t, k]`；
//!   3. 发射后任何有容量限制的库所的令牌总数不超过其容量；
//! * 若存在结构可激发的瞬时迁移，则只有瞬时迁移可激发，且其中仅最高优先级者可激发；
//! * 发射后 `M' = M - Pre[:, t] + Post[:, t]`，`ω` 吸收加减。
//!
//! 速率为按标识求值的表达式（见 [`rate`]），网可由 JSON/RON 文档加载（见 [`io`]）。
//!
//! ## 示例
//!
//! ```rust
//! use pnss::net::*;
//!
//! let mut net = Net::empty();
//! let p0 = net.add_place(Place::new("p0").with_tokens(DEFAULT_TOKEN, 1));
//! let p1 = net.add_place(Place::new("p1"));
//! let t0 = net.add_transition(Transition::new("t0"));
//!
//! net.add_input_arc(p0, t0, 1);
//! net.add_output_arc(p1, t0, 1);
//!
//! let marking = net.initial_marking();
//! assert_eq!(net.enabled_transitions(&marking), vec![t0]);
//! let next = net.fire_transition(&marking, t0).unwrap();
//! assert_eq!(next.total(p0).finite(), Some(0));
//! assert_eq!(next.total(p1).finite(), Some(1));
//! ```

pub mod core;
pub mod ids;
pub mod incidence;
pub mod index_vec;
pub mod io;
pub mod rate;
pub mod structure;

pub use core::{FireError, Net};
pub use ids::{PlaceId, StateId, TokenId, TransitionId};
pub use incidence::{ArcWeight, Incidence};
pub use index_vec::{Idx, IndexVec};
pub use io::{read_net, write_net, IoError, NetDocument};
pub use rate::{RateError, RateExpr, RateTable};
pub use structure::{
    Arc, ArcDirection, Place, RateParameter, TokenType, Transition, TransitionKind, Weight,
    DEFAULT_TOKEN,
};
