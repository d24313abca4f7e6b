//! Local-file lookup used to play offline copies instead of streaming.

use async_trait::async_trait;
use bridge_traits::MediaSource;
use core_offline::ResourceRegistry;
use std::path::PathBuf;

/// Finds an existing local copy of a remote track.
#[async_trait]
pub trait LocalTrackResolver: Send + Sync {
    async fn local_file(&self, url: &str) -> Option<PathBuf>;
}

#[async_trait]
impl LocalTrackResolver for ResourceRegistry {
    async fn local_file(&self, url: &str) -> Option<PathBuf> {
        if !self.is_available(url).await {
            return None;
        }
        ResourceRegistry::local_file(self, url).await
    }
}

/// Source for `url`: the local copy when `resolver` has one, else the stream.
pub async fn resolve_source(resolver: Option<&dyn LocalTrackResolver>, url: &str) -> MediaSource {
    if let Some(resolver) = resolver {
        if let Some(path) = resolver.local_file(url).await {
            return MediaSource::LocalFile { path };
        }
    }

    MediaSource::RemoteStream {
        url: url.to_string(),
    }
}
