//! Error types and handling for the map pipeline

use thiserror::Error;

/// Main error type for the `prettymap` library
#[derive(Error, Debug)]
pub enum MapError {
    /// The location query could not be matched to a real-world place
    #[error("Geocoding error: {message}")]
    Geocoding { message: String },

    /// A remote geometry or search service was unreachable or answered garbage
    #[error("Upstream error: {message}")]
    Upstream { message: String },

    /// An uploaded boundary file was unsupported or corrupt
    #[error("File format error: {message}")]
    FileFormat { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl MapError {
    /// Create a new geocoding error
    pub fn geocoding<S: Into<String>>(message: S) -> Self {
        Self::Geocoding {
            message: message.into(),
        }
    }

    /// Create a new upstream error
    pub fn upstream<S: Into<String>>(message: S) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Create a new file format error
    pub fn file_format<S: Into<String>>(message: S) -> Self {
        Self::FileFormat {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            MapError::Geocoding { message } => {
                format!("Could not find that location ({message}). Try adjusting the location or radius.")
            }
            MapError::Upstream { .. } => {
                "Unable to fetch map data from OpenStreetMap. Please try again later.".to_string()
            }
            MapError::FileFormat { message } => format!("File processing failed: {message}"),
            MapError::Validation { message } => format!("Invalid input: {message}"),
            MapError::Config { .. } => {
                "Configuration error. Please check your config file.".to_string()
            }
            MapError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
        }
    }
}

impl From<zip::result::ZipError> for MapError {
    fn from(err: zip::result::ZipError) -> Self {
        MapError::file_format(format!("Invalid ZIP archive: {err}"))
    }
}

impl From<geojson::Error> for MapError {
    fn from(err: geojson::Error) -> Self {
        MapError::file_format(format!("Invalid GeoJSON: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let geocoding_err = MapError::geocoding("no match");
        assert!(matches!(geocoding_err, MapError::Geocoding { .. }));

        let upstream_err = MapError::upstream("connection failed");
        assert!(matches!(upstream_err, MapError::Upstream { .. }));

        let file_err = MapError::file_format("bad zip");
        assert!(matches!(file_err, MapError::FileFormat { .. }));
    }

    #[test]
    fn test_user_messages() {
        let upstream_err = MapError::upstream("test");
        assert!(upstream_err.user_message().contains("OpenStreetMap"));

        let geocoding_err = MapError::geocoding("Atlantis");
        assert!(geocoding_err.user_message().contains("Atlantis"));

        let validation_err = MapError::validation("test input");
        assert!(validation_err.user_message().contains("test input"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let map_err: MapError = io_err.into();
        assert!(matches!(map_err, MapError::Io { .. }));
    }
}
