#![deny(dead_code)]
#![deny(unused_imports)]

pub mod genotype;
pub mod iterations;
pub mod logistic;
pub mod lrt;
pub mod model;
