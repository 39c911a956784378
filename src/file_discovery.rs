use crate::config::FileConfig;
use crate::error::{Result, ValidationError};
use globset::{GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Async discovery of record files below a root path
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    /// File extensions to include (e.g., ["json", "yaml"])
    extensions: Vec<String>,
    include_set: Option<GlobSet>,
    exclude_set: Option<GlobSet>,
    /// Maximum depth for directory traversal (None = unlimited)
    max_depth: Option<usize>,
    follow_symlinks: bool,
}

impl FileDiscovery {
    pub fn new() -> Self {
        Self {
            extensions: vec!["json".to_string(), "yaml".to_string(), "yml".to_string()],
            include_set: None,
            exclude_set: None,
            max_depth: None,
            follow_symlinks: false,
        }
    }

    /// Build a discovery engine from the `[files]` configuration section
    pub fn from_config(config: &FileConfig) -> Result<Self> {
        Self::new()
            .with_extensions(config.extensions.clone())
            .with_include_patterns(config.include_patterns.clone())?
            .with_exclude_patterns(config.exclude_patterns.clone())
            .map(|discovery| {
                discovery
                    .with_max_depth(config.max_depth)
                    .with_follow_symlinks(config.follow_symlinks)
            })
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.to_lowercase())
            .collect();
        self
    }

    pub fn with_include_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        self.include_set = build_glob_set(&patterns)?;
        Ok(self)
    }

    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        self.exclude_set = build_glob_set(&patterns)?;
        Ok(self)
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Discover record files in the given path (file or directory), sorted by path
    pub async fn discover_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        Ok(self.discover(path).await?.files)
    }

    /// Discover files and report how many entries could not be read
    pub async fn discover(&self, path: &Path) -> Result<Discovery> {
        let metadata = fs::metadata(path).await?;

        if metadata.is_file() {
            let files = if self.should_process(path) {
                vec![path.to_path_buf()]
            } else {
                Vec::new()
            };
            return Ok(Discovery { files, errors: 0 });
        }

        let mut discovery = Discovery::default();
        let mut read_dir = fs::read_dir(path).await?;

        while let Some(entry) = read_dir.next_entry().await? {
            let entry_path = entry.path();

            if entry_path.is_symlink() && !self.follow_symlinks {
                continue;
            }

            if let Err(e) = self
                .discover_recursive(&entry_path, 0, &mut discovery)
                .await
            {
                tracing::warn!(path = %entry_path.display(), error = %e, "skipping unreadable entry");
                discovery.errors += 1;
            }
        }

        discovery.files.sort();
        Ok(discovery)
    }

    fn discover_recursive<'a>(
        &'a self,
        path: &'a Path,
        depth: usize,
        discovery: &'a mut Discovery,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + 'a>> {
        Box::pin(async move {
            if let Some(max_depth) = self.max_depth
                && depth > max_depth
            {
                return Ok(());
            }

            let metadata = fs::metadata(path).await?;

            if metadata.is_file() {
                if self.should_process(path) {
                    discovery.files.push(path.to_path_buf());
                }
            } else if metadata.is_dir() {
                if let Some(max_depth) = self.max_depth
                    && depth >= max_depth
                {
                    return Ok(());
                }

                let mut read_dir = fs::read_dir(path).await?;

                while let Some(entry) = read_dir.next_entry().await? {
                    let entry_path = entry.path();

                    if entry_path.is_symlink() && !self.follow_symlinks {
                        continue;
                    }

                    if let Err(e) = self
                        .discover_recursive(&entry_path, depth + 1, discovery)
                        .await
                    {
                        tracing::warn!(path = %entry_path.display(), error = %e, "skipping unreadable entry");
                        discovery.errors += 1;
                    }
                }
            }

            Ok(())
        })
    }

    /// Check if a file should be processed based on extensions and patterns
    pub fn should_process(&self, path: &Path) -> bool {
        let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        if !self.extensions.contains(&extension.to_lowercase()) {
            return false;
        }

        if let Some(exclude_set) = &self.exclude_set
            && exclude_set.is_match(path)
        {
            return false;
        }

        // With include patterns, at least one must match
        if let Some(include_set) = &self.include_set {
            return include_set.is_match(path);
        }

        true
    }
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

fn build_glob_set(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = globset::GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| {
                ValidationError::Config(format!("Invalid glob pattern '{}': {}", pattern, e))
            })?;
        builder.add(glob);
    }

    let set = builder
        .build()
        .map_err(|e| ValidationError::Config(format!("Failed to build glob set: {}", e)))?;
    Ok(Some(set))
}

/// Files found by a discovery run
#[derive(Debug, Default, Clone)]
pub struct Discovery {
    pub files: Vec<PathBuf>,
    pub errors: usize,
}
