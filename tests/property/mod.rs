pub mod session_invariants;
