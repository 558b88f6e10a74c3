#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod io;
pub mod pipeline;
pub mod progress;
pub mod types;

#[path = "../calibrate/lib.rs"]
pub mod calibrate;
