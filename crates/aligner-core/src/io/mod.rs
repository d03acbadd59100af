pub mod load;
pub mod metadata;
pub mod save;

pub use load::load_channels_from_paths;
pub use metadata::{
    add_alignment_tag, Compression, MetadataDirectory, Resolution, ResolutionUnit, SaveOptions,
};
pub use save::{check_output_path, save_channels};
