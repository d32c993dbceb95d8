//! [`StorageHandler`] over an [`object_store`]

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use object_store::path::Path;
use object_store::{DynObjectStore, ObjectMeta};
use url::Url;

use crate::{DeltaResult, Error, FileMeta, StorageHandler};

#[derive(Debug)]
pub struct ObjectStoreStorageHandler {
    inner: Arc<DynObjectStore>,
}

impl ObjectStoreStorageHandler {
    pub fn new(store: Arc<DynObjectStore>) -> Self {
        Self { inner: store }
    }
}

// Wasn't checking the scheme before calling to_file_path causing the url path to be eaten in a
// strange way. If not a file scheme, just blindly convert to a path.
// https://docs.rs/url/latest/url/struct.Url.html#method.to_file_path
fn object_path(url: &Url) -> DeltaResult<Path> {
    match url.scheme() {
        "file" => {
            let file_path = url
                .to_file_path()
                .map_err(|_| Error::generic(format!("Not a valid file path: {url}")))?;
            Ok(Path::from_absolute_path(file_path)?)
        }
        _ => Ok(Path::from_url_path(url.path())?),
    }
}

fn file_meta(base: &Url, meta: ObjectMeta) -> FileMeta {
    let mut location = base.clone();
    location.set_path(&format!("/{}", meta.location.as_ref()));
    FileMeta {
        location,
        last_modified: meta.last_modified.timestamp_millis(),
        size: meta.size,
    }
}

/// The directory part of `path`: everything up to the last `/`.
fn parent_directory(path: &Url) -> DeltaResult<Path> {
    let url_path = path.path();
    let dir = match url_path.rfind('/') {
        Some(idx) => &url_path[..=idx],
        None => "/",
    };
    let mut dir_url = path.clone();
    dir_url.set_path(dir);
    object_path(&dir_url)
}

#[async_trait::async_trait]
impl StorageHandler for ObjectStoreStorageHandler {
    async fn list_from(&self, path: &Url) -> DeltaResult<BoxStream<'_, DeltaResult<FileMeta>>> {
        let offset = object_path(path)?;
        let prefix = parent_directory(path)?;

        // object stores list recursively and not necessarily in order. Keep direct children only
        // and sort them by name.
        let mut files: Vec<ObjectMeta> = self
            .inner
            .list_with_offset(Some(&prefix), &offset)
            .try_filter(|meta| {
                let direct_child = meta
                    .location
                    .prefix_match(&prefix)
                    .is_some_and(|parts| parts.count() == 1);
                futures::future::ready(direct_child)
            })
            .try_collect()
            .await?;
        files.sort_unstable_by(|a, b| a.location.cmp(&b.location));

        let base = path.clone();
        Ok(stream::iter(files)
            .map(move |meta| Ok(file_meta(&base, meta)))
            .boxed())
    }

    async fn read_file(&self, path: &Url) -> DeltaResult<Bytes> {
        let location = object_path(path)?;
        Ok(self.inner.get(&location).await?.bytes().await?)
    }

    async fn open_read(&self, path: &Url) -> DeltaResult<BoxStream<'static, DeltaResult<Bytes>>> {
        let location = object_path(path)?;
        let result = self.inner.get(&location).await?;
        Ok(result.into_stream().map_err(Error::from).boxed())
    }

    async fn exists(&self, path: &Url) -> DeltaResult<bool> {
        let location = object_path(path)?;
        match self.inner.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
