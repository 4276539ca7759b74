//! Payload types shared by the benchmarks and tests.
use serde::{
    Serialize,
    Deserialize,
};
use flat::FlatBuffer;
use typed_mpi::{flat_message, structured_message};

mod datatype;
pub use datatype::DataType;

/// Generate a vector of a simple type of the given size (roughly).
pub fn simple(size: usize) -> Vec<i32> {
    let count = size / std::mem::size_of::<i32>();
    (0..count as i32).collect()
}

pub const X_ITEM_COUNT: usize = 16;

fn pattern(f: f32) -> [f32; X_ITEM_COUNT] {
    let mut x = [0.0; X_ITEM_COUNT];
    for (j, item) in x.iter_mut().enumerate() {
        *item = match j % 4 {
            0 => 0.01 * f,
            1 => 0.06 * f,
            2 => f,
            _ => 0.1 * f,
        };
    }
    x
}

/// Fixed-size record, transmitted as raw memory.
#[repr(C)]
#[derive(Serialize, Deserialize, FlatBuffer, Copy, Clone, Default, Debug, PartialEq)]
pub struct ComplexNoncompound {
    pub i: i32,
    pub tag: i32,
    pub d: f64,
    pub x: [f32; X_ITEM_COUNT],
}

flat_message!(ComplexNoncompound);

// Tile, bucket, and alternating (from Xiong et al.)
pub fn complex_noncompound(size: usize) -> Vec<ComplexNoncompound> {
    let count = size / std::mem::size_of::<ComplexNoncompound>();
    (0..count as i32)
        .map(|i| ComplexNoncompound {
            i,
            tag: i % 3,
            d: i as f64,
            x: pattern(i as f32),
        })
        .collect()
}

/// Record owning heap data, transmitted through the codec.
#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq)]
pub struct ComplexCompound {
    pub i: i32,
    pub d: f64,
    pub x: Vec<f32>,
}

structured_message!(ComplexCompound);

pub fn complex_compound(size: usize) -> Vec<ComplexCompound> {
    let elm_size = std::mem::size_of::<i32>()
                   + std::mem::size_of::<f64>()
                   + std::mem::size_of::<usize>()
                   + std::mem::size_of::<f32>() * X_ITEM_COUNT;
    let count = size / elm_size;
    (0..count as i32)
        .map(|i| ComplexCompound {
            i,
            d: i as f64,
            x: pattern(i as f32).to_vec(),
        })
        .collect()
}
