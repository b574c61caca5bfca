//! Raster tile provider for XYZ/TMS tile servers.

use std::sync::Arc;

use quadmap_geometry::{HeightGrid, TileImage, decode_image, height_grid_from_terrain_rgb};

use super::{ProviderFuture, ProviderMetadata, TileProvider, TilingScheme};
use crate::cache::{Cache, NoCache};
use crate::coordinate::TileCoordinate;
use crate::error::{Error, Result};

const OPENSTREETMAP_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Fetches PNG/JPEG tiles from a URL template.
///
/// The template may contain `{z}`, `{x}`, `{y}` and `{s}`; `{s}` rotates
/// through the configured subdomains. An optional second template serves
/// Terrain-RGB encoded elevation tiles.
///
/// # Example
///
/// ```ignore
/// let provider = HttpProvider::openstreetmap().with_cache(MemoryCache::new());
/// let image = provider.fetch_tile(TileCoordinate::ROOT).await?;
/// ```
pub struct HttpProvider<C: Cache = NoCache> {
    http: reqwest::Client,
    cache: Arc<C>,
    url_template: String,
    elevation_template: Option<String>,
    subdomains: Vec<String>,
    metadata: ProviderMetadata,
}

impl HttpProvider<NoCache> {
    /// Create an uncached provider for a URL template.
    #[must_use]
    pub fn new(name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            cache: Arc::new(NoCache),
            url_template: url_template.into(),
            elevation_template: None,
            subdomains: Vec::new(),
            metadata: ProviderMetadata::new(name),
        }
    }

    /// The public OpenStreetMap raster tiles (levels 0 to 19).
    #[must_use]
    pub fn openstreetmap() -> Self {
        Self::new("openstreetmap", OPENSTREETMAP_URL)
            .with_subdomains(["a", "b", "c"])
            .with_zoom_range(0, 19)
    }
}

impl<C: Cache> HttpProvider<C> {
    /// Use `cache` for downloaded payloads.
    #[must_use]
    pub fn with_cache<D: Cache>(self, cache: D) -> HttpProvider<D> {
        HttpProvider {
            http: self.http,
            cache: Arc::new(cache),
            url_template: self.url_template,
            elevation_template: self.elevation_template,
            subdomains: self.subdomains,
            metadata: self.metadata,
        }
    }

    /// Use a preconfigured HTTP client (user agent, timeouts).
    #[must_use]
    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Subdomains substituted for `{s}`.
    #[must_use]
    pub fn with_subdomains<S: Into<String>>(mut self, subdomains: impl IntoIterator<Item = S>) -> Self {
        self.subdomains = subdomains.into_iter().map(Into::into).collect();
        self
    }

    /// Serve elevation from Terrain-RGB tiles at `template`.
    #[must_use]
    pub fn with_elevation_template(mut self, template: impl Into<String>) -> Self {
        self.elevation_template = Some(template.into());
        self
    }

    /// Advertise a zoom range.
    #[must_use]
    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.metadata = self.metadata.with_zoom_range(min_zoom, max_zoom);
        self
    }

    /// Set the row numbering used by the server.
    #[must_use]
    pub fn with_tiling_scheme(mut self, tiling_scheme: TilingScheme) -> Self {
        self.metadata.tiling_scheme = tiling_scheme;
        self
    }

    /// Expand a URL template for a tile.
    #[must_use]
    pub fn tile_url(&self, template: &str, coordinate: &TileCoordinate) -> String {
        let mut url = template
            .replace("{z}", &coordinate.level().to_string())
            .replace("{x}", &coordinate.x().to_string())
            .replace("{y}", &self.metadata.tiling_scheme.row(coordinate).to_string());
        if !self.subdomains.is_empty() {
            let index = (coordinate.x() as usize + coordinate.y() as usize) % self.subdomains.len();
            url = url.replace("{s}", &self.subdomains[index]);
        }
        url
    }

    /// Fetch raw bytes from a URL, using the cache if available.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(data) = self.cache.get(url).await? {
            tracing::trace!(url, "cache hit");
            return Ok(data);
        }

        tracing::debug!(url, "fetching");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Http {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| Error::Http {
                url: url.to_string(),
                message: e.to_string(),
            })?
            .to_vec();

        self.cache.put(url, data.clone()).await?;

        Ok(data)
    }
}

impl<C: Cache> TileProvider for HttpProvider<C> {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn fetch_tile(&self, coordinate: TileCoordinate) -> ProviderFuture<'_, TileImage> {
        let url = self.tile_url(&self.url_template, &coordinate);
        Box::pin(async move {
            let data = self.fetch_bytes(&url).await?;
            Ok(decode_image(&data)?)
        })
    }

    fn fetch_elevation(&self, coordinate: TileCoordinate) -> ProviderFuture<'_, HeightGrid> {
        let Some(template) = &self.elevation_template else {
            let provider = self.metadata.name.clone();
            return Box::pin(async move {
                Err(Error::Unsupported {
                    provider,
                    operation: "elevation",
                })
            });
        };
        let url = self.tile_url(template, &coordinate);
        Box::pin(async move {
            let data = self.fetch_bytes(&url).await?;
            let image = decode_image(&data)?;
            Ok(height_grid_from_terrain_rgb(
                &image.data,
                image.width,
                image.height,
            )?)
        })
    }

    fn metadata(&self) -> ProviderFuture<'_, ProviderMetadata> {
        let metadata = self.metadata.clone();
        Box::pin(async move { Ok(metadata) })
    }
}
