pub mod flatten;
pub mod hasher;
pub mod normalize;
pub mod scanner;
