//! Individual pipeline stages

pub mod color;
pub mod crop;
pub mod decode;
pub mod label;
pub mod layout;
pub mod normalize;
pub mod pack;
pub mod rec_resize;
pub mod resize;

pub use color::RandomColorAdjust;
pub use crop::RandomCropWithBBox;
pub use decode::DecodeImage;
pub use label::{ClsLabelEncode, RecLabelEncode};
pub use layout::ToCHWImage;
pub use normalize::NormalizeImage;
pub use pack::PackLoaderInputs;
pub use rec_resize::{RecResizeImg, RecResizeNormForInfer, Rotate90IfVertical};
pub use resize::{GridResize, RandomScale, ScalePadImage};
