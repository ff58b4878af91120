//! Reachability and coverability state-space exploration of generalised
//! stochastic Petri nets.
//!
//! A [`net::Net`] is explored by an [`explorer::StateSpaceExplorer`] into a
//! [`store::StateSpaceStore`]: states with their tangible/vanishing
//! classification and one successor record per state.

pub mod config;
pub mod explorer;
pub mod net;
pub mod options;
pub mod state;
pub mod store;
