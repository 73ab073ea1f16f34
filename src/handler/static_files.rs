//! Static file serving module
//!
//! Resolves `/uploads/*` and `/assets/*` paths to files, picks the MIME type
//! and cache policy, and builds the response.

use hyper::body::Bytes;
use hyper::header::{HeaderMap, IF_NONE_MATCH};
use hyper::{Method, Response};
use http_body_util::Full;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::config::StaticFilesConfig;
use crate::error::DispatchError;
use crate::http::cache::{self, CachePolicy, FALLBACK_MAX_AGE, LONG_MAX_AGE};
use crate::http::{self as http_layer, mime, CorsHeaders, StaticBody};
use crate::logger;
use crate::routing::StaticRoot;

/// Conditional-request details of a static request
#[derive(Debug, Clone, Default)]
pub struct StaticRequest {
    pub is_head: bool,
    pub if_none_match: Option<String>,
}

impl StaticRequest {
    pub fn from_parts(method: &Method, headers: &HeaderMap) -> Self {
        Self {
            is_head: method == Method::HEAD,
            if_none_match: headers
                .get(IF_NONE_MATCH)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string),
        }
    }
}

/// A file chosen to answer a static request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    /// Canonical absolute path
    pub path: PathBuf,
    pub content_type: &'static str,
    pub cache: CachePolicy,
    /// The default image stood in for a missing asset
    pub fallback: bool,
}

#[derive(Debug, Clone)]
pub struct StaticResolver {
    uploads_root: PathBuf,
    assets_root: PathBuf,
    default_image: Option<PathBuf>,
}

impl StaticResolver {
    pub fn new(
        uploads_root: impl Into<PathBuf>,
        assets_root: impl Into<PathBuf>,
        default_image: Option<PathBuf>,
    ) -> Self {
        Self {
            uploads_root: uploads_root.into(),
            assets_root: assets_root.into(),
            default_image,
        }
    }

    pub fn from_config(config: &StaticFilesConfig) -> Self {
        Self::new(
            &config.uploads_dir,
            &config.assets_dir,
            config.default_image.as_ref().map(PathBuf::from),
        )
    }

    fn root(&self, root: StaticRoot) -> &Path {
        match root {
            StaticRoot::Uploads => &self.uploads_root,
            StaticRoot::Assets => &self.assets_root,
        }
    }

    /// Resolve a path relative to a static root.
    ///
    /// Missing assets fall back to the default image; missing uploads do not.
    pub fn resolve(&self, root: StaticRoot, relative: &str) -> Result<ResolvedAsset, DispatchError> {
        let not_found = || DispatchError::StaticFileNotFound(relative.to_string());
        let base = self.root(root);

        let Some(candidate) = map_path(base, relative) else {
            logger::log_warning(&format!(
                "Path traversal attempt blocked: /{}/{relative}",
                root.as_str()
            ));
            return Err(not_found());
        };

        match locate(base, &candidate) {
            Located::File(path) => Ok(ResolvedAsset {
                content_type: mime::content_type_for(&path),
                path,
                cache: CachePolicy::Public(LONG_MAX_AGE),
                fallback: false,
            }),
            Located::Escaped(path) => {
                logger::log_warning(&format!(
                    "Path traversal attempt blocked: /{}/{relative} -> {}",
                    root.as_str(),
                    path.display()
                ));
                Err(not_found())
            }
            Located::Missing => match root {
                StaticRoot::Uploads => Err(not_found()),
                StaticRoot::Assets => self.fallback().ok_or_else(not_found),
            },
        }
    }

    fn fallback(&self) -> Option<ResolvedAsset> {
        let image = self.default_image.as_ref()?;
        let path = image.canonicalize().ok().filter(|p| p.is_file())?;
        Some(ResolvedAsset {
            content_type: mime::content_type_for(&path),
            path,
            cache: CachePolicy::Public(FALLBACK_MAX_AGE),
            fallback: true,
        })
    }

    /// Resolve and read a static file, answering 200, 304 or 404
    pub async fn serve(
        &self,
        cors: &CorsHeaders,
        root: StaticRoot,
        relative: &str,
        request: &StaticRequest,
    ) -> Response<Full<Bytes>> {
        let asset = match self.resolve(root, relative) {
            Ok(asset) => asset,
            Err(e) => return http_layer::build_error_response(cors, &e),
        };

        let data = match fs::read(&asset.path).await {
            Ok(data) => data,
            Err(e) => {
                logger::log_error(&format!(
                    "Failed to read file '{}': {e}",
                    asset.path.display()
                ));
                let err = DispatchError::StaticFileNotFound(relative.to_string());
                return http_layer::build_error_response(cors, &err);
            }
        };

        if asset.fallback {
            logger::log_debug(&format!(
                "Asset '{relative}' missing, serving {}",
                asset.path.display()
            ));
        }

        // only genuine uploads are opened to every origin
        let public_origin = root == StaticRoot::Uploads && !asset.fallback;
        let etag = cache::generate_etag(&data);

        if cache::check_etag_match(request.if_none_match.as_deref(), &etag) {
            return http_layer::build_304_response(cors, &etag, asset.cache, public_origin);
        }

        http_layer::build_static_response(
            cors,
            StaticBody {
                data: Bytes::from(data),
                content_type: asset.content_type,
                etag: &etag,
                cache: asset.cache,
                is_head: request.is_head,
                public_origin,
            },
        )
    }
}

enum Located {
    File(PathBuf),
    Escaped(PathBuf),
    Missing,
}

/// Join `relative` onto `base`, refusing anything but plain names
fn map_path(base: &Path, relative: &str) -> Option<PathBuf> {
    let mut path = base.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(name) => path.push(name),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(path)
}

/// Check the candidate is a regular file that stays inside `base` once
/// symlinks are resolved
fn locate(base: &Path, candidate: &Path) -> Located {
    if !candidate.is_file() {
        return Located::Missing;
    }
    let base_canonical = match base.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            logger::log_warning(&format!(
                "Static directory not found or inaccessible '{}': {e}",
                base.display()
            ));
            return Located::Missing;
        }
    };
    let Ok(canonical) = candidate.canonicalize() else {
        return Located::Missing;
    };
    if canonical.starts_with(&base_canonical) {
        Located::File(canonical)
    } else {
        Located::Escaped(canonical)
    }
}
