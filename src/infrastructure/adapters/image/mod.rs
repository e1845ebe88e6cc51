//! Image Adapters - 图像生成适配器

mod fake_image_client;
mod hf_image_client;

pub use fake_image_client::FakeImageClient;
pub use hf_image_client::{HuggingFaceImageClient, HuggingFaceImageConfig};
