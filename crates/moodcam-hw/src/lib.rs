//! moodcam-hw — V4L2 camera access for the detection session.
//!
//! Opens capture devices, converts their buffers to RGB and exposes them
//! through the core [`moodcam_core::MediaDevices`] contract.

pub mod camera;
pub mod frame;
pub mod stream;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::FrameError;
pub use stream::{V4lMediaDevices, V4lStream, V4lTrack};
