#![no_std]

extern crate alloc;

pub mod grow_vec;
