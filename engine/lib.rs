#![deny(dead_code)]
#![deny(unused_imports)]

pub mod evaluate;
pub mod model;
pub mod schema;
pub mod shapley;
pub mod standardize;
pub mod survival;
pub mod tier;
