use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// 確認路徑存在且為資料夾，回傳正規化後的絕對路徑
pub fn validate_directory_exists(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        bail!("路徑不存在: {}", path.display());
    }
    if !path.is_dir() {
        bail!("路徑不是資料夾: {}", path.display());
    }
    path.canonicalize()
        .with_context(|| format!("無法解析路徑: {}", path.display()))
}

/// 兩者皆須為正規化路徑
pub fn ensure_within_root(path: &Path, root: &Path) -> Result<()> {
    if !path.starts_with(root) {
        bail!(
            "資料夾不在限制的根目錄內: {} (根目錄: {})",
            path.display(),
            root.display()
        );
    }
    Ok(())
}
