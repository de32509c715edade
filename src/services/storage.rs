use s3::creds::Credentials;
use s3::{Bucket, Region};

/// Client for the S3-compatible store holding persisted sensor images.
pub struct ImageStore {
    bucket: Box<Bucket>,
}

impl ImageStore {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?
            .with_path_style();

        Ok(Self { bucket })
    }

    /// Fetch a stored image by object key. A missing key is not an
    /// error: the caller decides what an absent asset means.
    pub async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match self.bucket.get_object(key).await {
            Ok(response) => Ok(Some(response.to_vec())),
            Err(s3::error::S3Error::HttpFailWithBody(404, _)) => {
                tracing::warn!(key, "Stored image not found");
                Ok(None)
            }
            Err(e) => Err(StorageError::S3(e)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
