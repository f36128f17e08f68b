//! `chronicle.v0` wire messages, per spec.md §6.2. Hand-derived `prost`
//! structs (no `.proto`/build.rs — the wire shapes are small and fixed).

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct RectI32 {
    #[prost(int32, tag = "1")]
    pub x: i32,
    #[prost(int32, tag = "2")]
    pub y: i32,
    #[prost(int32, tag = "3")]
    pub w: i32,
    #[prost(int32, tag = "4")]
    pub h: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct FrameMeta {
    #[prost(string, tag = "1")]
    pub session_id: String,
    #[prost(uint64, tag = "2")]
    pub frame_index: u64,
    #[prost(uint64, tag = "3")]
    pub qpc_ticks: u64,
    #[prost(uint64, tag = "4")]
    pub unix_ns: u64,
    #[prost(uint32, tag = "5")]
    pub width: u32,
    #[prost(uint32, tag = "6")]
    pub height: u32,
    #[prost(message, optional, tag = "7")]
    pub desktop_rect: Option<RectI32>,
    #[prost(message, repeated, tag = "8")]
    pub dirty_rects: Vec<RectI32>,
    #[prost(string, tag = "9")]
    pub artifact_path: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct FrameMetaBatch {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<FrameMeta>,
}

#[derive(Clone, Copy, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum InputEventType {
    Mouse = 0,
    Control = 1,
    GenericHid = 2,
}

#[derive(Clone, PartialEq, Message)]
pub struct MouseInput {
    #[prost(int32, tag = "1")]
    pub x: i32,
    #[prost(int32, tag = "2")]
    pub y: i32,
    #[prost(uint32, tag = "3")]
    pub buttons: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ControlInput {
    #[prost(string, tag = "1")]
    pub key: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct GenericHidInput {
    #[prost(bytes, tag = "1")]
    pub raw: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct InputEvent {
    #[prost(string, tag = "1")]
    pub session_id: String,
    #[prost(uint64, tag = "2")]
    pub event_index: u64,
    #[prost(uint64, tag = "3")]
    pub qpc_ticks: u64,
    #[prost(uint64, tag = "4")]
    pub unix_ns: u64,
    #[prost(string, tag = "5")]
    pub device_id: String,
    #[prost(enumeration = "InputEventType", tag = "6")]
    pub r#type: i32,
    #[prost(message, optional, tag = "7")]
    pub mouse: Option<MouseInput>,
    #[prost(message, optional, tag = "8")]
    pub control: Option<ControlInput>,
    #[prost(message, optional, tag = "9")]
    pub generic_hid: Option<GenericHidInput>,
}

#[derive(Clone, PartialEq, Message)]
pub struct InputEventBatch {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<InputEvent>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Detection {
    #[prost(uint64, tag = "1")]
    pub frame_index: u64,
    #[prost(string, tag = "2")]
    pub label: String,
    #[prost(message, optional, tag = "3")]
    pub bbox: Option<RectI32>,
    #[prost(float, tag = "4")]
    pub confidence: f32,
}

#[derive(Clone, PartialEq, Message)]
pub struct DetectionBatch {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<Detection>,
}
