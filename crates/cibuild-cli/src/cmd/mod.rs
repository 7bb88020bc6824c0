pub mod install;
pub mod prune;
pub mod publish;
pub mod resolve;
pub mod reverse_deps;
pub mod seed;
pub mod tree;
