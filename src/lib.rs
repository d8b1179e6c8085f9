#![doc = include_str!("../README.md")]

pub mod bean;
pub mod builder;
pub mod convert;
pub mod engine;
mod error;
pub mod stream;
mod token;
pub mod value;

pub use builder::JsonBindBuilder;
pub use engine::JsonBind;
pub use error::{Error, Result};
pub use token::TypeToken;
pub use value::{
    boxed, BigDecimal, BigInteger, Bytes, Dynamic, DynamicMapping, DynamicObject, DynamicRef,
    DynamicSequence, DynamicValue, DynamicVariant, FromDynamic, Null, Tokenized,
};
