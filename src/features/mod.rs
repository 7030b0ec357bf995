//! Feature schema and encoding

pub mod encoder;
pub mod spec;

pub use encoder::{encode, Encoded, FeatureEncoder, FeatureVector, ParseWarning};
pub use spec::{CategoryCode, FeatureSpec, FieldDescriptor, FieldKind, FRAUD_SPEC_VERSION};
