pub mod assets;
pub mod providers;
pub mod studio;

pub use assets::AssetStore;
pub use providers::{
    DefaultProviders, GenerateRequest, GeneratedImage, ImageProvider, ProviderError,
    ProviderFactory,
};
pub use studio::{AdminDesignRow, GalleryItem, StudioEngine, StudioPaths};
