//! Protobuf messages for the plan body.
//!
//! Hand-written `prost` messages; the schema is small enough that a
//! `.proto` file and build script would only add a `protoc` dependency.

/// A compiled plan body.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PlanProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint64, repeated, tag = "2")]
    pub input_shape: Vec<u64>,
    #[prost(uint64, repeated, tag = "3")]
    pub output_shape: Vec<u64>,
    #[prost(message, repeated, tag = "4")]
    pub layers: Vec<LayerProto>,
}

/// One layer of the plan.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LayerProto {
    #[prost(oneof = "layer_proto::Kind", tags = "1, 2, 3, 4, 5")]
    pub kind: Option<layer_proto::Kind>,
}

pub mod layer_proto {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        Take(super::TakeProto),
        #[prost(message, tag = "2")]
        GlobalAvgPool(super::GlobalAvgPoolProto),
        #[prost(message, tag = "3")]
        Dense(super::DenseProto),
        #[prost(message, tag = "4")]
        Relu(super::ReluProto),
        #[prost(message, tag = "5")]
        Softmax(super::SoftmaxProto),
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct TakeProto {
    #[prost(uint64, tag = "1")]
    pub offset: u64,
    #[prost(uint64, tag = "2")]
    pub len: u64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct GlobalAvgPoolProto {
    #[prost(uint64, tag = "1")]
    pub channels: u64,
    #[prost(uint64, tag = "2")]
    pub spatial: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DenseProto {
    #[prost(uint64, tag = "1")]
    pub in_features: u64,
    #[prost(uint64, tag = "2")]
    pub out_features: u64,
    /// Row-major `out_features x in_features`.
    #[prost(float, repeated, tag = "3")]
    pub weight: Vec<f32>,
    #[prost(float, repeated, tag = "4")]
    pub bias: Vec<f32>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ReluProto {}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SoftmaxProto {}
