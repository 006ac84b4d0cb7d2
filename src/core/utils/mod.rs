//! 工具
mod image;
pub use self::image::{decode_base64_image, decode_rgb_image, image_to_pixel_values, load_rgb_image};
