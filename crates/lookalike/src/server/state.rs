use std::sync::Arc;

use lookalike_core::{
    BlobStore, Config, FeatureExtractor, ImageService, ProfileService, SimilarityStore,
};

/// Shared handler state.
pub struct AppState {
    pub images: ImageService,
    pub profiles: ProfileService,
}

impl AppState {
    pub fn new(
        config: &Config,
        extractor: Arc<dyn FeatureExtractor>,
        store: Arc<dyn SimilarityStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let images = ImageService::new(config, extractor, store, blobs);
        let profiles = images.profiles();
        Self { images, profiles }
    }
}
