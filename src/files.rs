use std::cmp::Ordering;
use std::str::FromStr;

use tracing::{debug, info};

use crate::api::{FileApi, UploadSource};
use crate::error::{Error, Result};
use crate::models::FileRecord;

pub const MAX_FILE_NAME_LEN: usize = 255;
pub const FORBIDDEN_NAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Checks a new display name and returns it trimmed.
pub fn validate_file_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("File name must not be empty"));
    }
    if trimmed.chars().count() > MAX_FILE_NAME_LEN {
        return Err(Error::validation(format!(
            "File name is too long (at most {MAX_FILE_NAME_LEN} characters)"
        )));
    }
    if trimmed.contains(&FORBIDDEN_NAME_CHARS[..]) {
        return Err(Error::validation(
            "File name must not contain any of: < > : \" / \\ | ? *",
        ));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    /// Alphabetical by name, ignoring case.
    Name,
    /// Largest first.
    Size,
    /// Newest first.
    #[default]
    Date,
    /// Keep list order.
    Unsorted,
}

impl SortBy {
    fn compare(&self, a: &FileRecord, b: &FileRecord) -> Ordering {
        match self {
            Self::Name => a
                .name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name)),
            Self::Size => b.size.cmp(&a.size),
            Self::Date => b.uploaded_at.cmp(&a.uploaded_at),
            Self::Unsorted => Ordering::Equal,
        }
    }
}

impl FromStr for SortBy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "name" => Self::Name,
            "size" => Self::Size,
            "date" => Self::Date,
            _ => Self::Unsorted,
        })
    }
}

/// The client's copy of the user's files.
///
/// Every mutation goes through the API first; the local list only changes
/// once the server has confirmed it.
pub struct FileLibrary<A> {
    api: A,
    files: Vec<FileRecord>,
}

impl<A: FileApi> FileLibrary<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            files: Vec::new(),
        }
    }

    pub fn with_files(api: A, files: Vec<FileRecord>) -> Self {
        Self { api, files }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn get(&self, id: &str) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Replaces the local list with the server's.
    pub async fn refresh(&mut self) -> Result<()> {
        let files = self.api.list_my_files().await?;
        debug!(count = files.len(), "file list refreshed");
        self.files = files;
        Ok(())
    }

    /// Uploads and puts the new record at the front.
    pub async fn upload(&mut self, source: &UploadSource) -> Result<&FileRecord> {
        let record = self.api.upload_file(source).await?;
        info!(id = %record.id, name = %record.name, "file uploaded");
        self.files.retain(|f| f.id != record.id);
        self.files.insert(0, record);
        Ok(&self.files[0])
    }

    /// Uploads in order and stops at the first failure. Files uploaded
    /// before the failure stay in the list.
    pub async fn upload_all(&mut self, sources: &[UploadSource]) -> Result<usize> {
        for (done, source) in sources.iter().enumerate() {
            if let Err(e) = self.upload(source).await {
                debug!(uploaded = done, failed = %source.file_name, "upload batch stopped");
                return Err(e);
            }
        }
        Ok(sources.len())
    }

    /// Renames in place and returns the server's record. Invalid names are
    /// rejected before any request. An id that is not in the local list
    /// leaves the list as it is.
    pub async fn rename(&mut self, id: &str, new_name: &str) -> Result<FileRecord> {
        let name = validate_file_name(new_name)?;
        let updated = self.api.rename_file(id, &name).await?;
        info!(id, name = %updated.name, "file renamed");

        match self.files.iter_mut().find(|f| f.id == id) {
            Some(slot) => *slot = updated.clone(),
            None => debug!(id, "renamed file is not in the local list"),
        }
        Ok(updated)
    }

    pub async fn delete(&mut self, id: &str) -> Result<()> {
        self.api.delete_file(id).await?;
        info!(id, "file deleted");
        self.files.retain(|f| f.id != id);
        Ok(())
    }

    /// Case-insensitive name filter followed by a stable sort.
    pub fn view(&self, search: &str, sort_by: SortBy) -> Vec<&FileRecord> {
        let needle = search.to_lowercase();
        let mut view: Vec<&FileRecord> = self
            .files
            .iter()
            .filter(|f| f.name.to_lowercase().contains(&needle))
            .collect();
        view.sort_by(|a, b| sort_by.compare(a, b));
        view
    }
}

/// `0 Bytes`, `1.5 KB`, `2 MB`, ...
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let rounded = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rounded, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileType;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Mutex;

    fn record(id: &str, name: &str, size: u64, uploaded_at: DateTime<Utc>) -> FileRecord {
        FileRecord {
            id: id.into(),
            name: name.into(),
            size,
            content_type: "text/plain".into(),
            file_type: FileType::Document,
            uploaded_at,
            download_url: format!("http://x/files/download/{id}?token=t"),
        }
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    /// Scripted backend: replies come from queues, every call is recorded.
    #[derive(Default)]
    struct FakeApi {
        calls: Mutex<Vec<String>>,
        uploads: Mutex<Vec<Result<FileRecord>>>,
        renames: Mutex<Vec<Result<FileRecord>>>,
        deletes: Mutex<Vec<Result<()>>>,
        listing: Mutex<Option<Result<Vec<FileRecord>>>>,
    }

    impl FakeApi {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record_call(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl FileApi for FakeApi {
        async fn upload_file(&self, source: &UploadSource) -> Result<FileRecord> {
            self.record_call(format!("upload {}", source.file_name));
            self.uploads.lock().unwrap().remove(0)
        }

        async fn list_my_files(&self) -> Result<Vec<FileRecord>> {
            self.record_call("list".into());
            self.listing
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn rename_file(&self, id: &str, new_name: &str) -> Result<FileRecord> {
            self.record_call(format!("rename {id} {new_name}"));
            self.renames.lock().unwrap().remove(0)
        }

        async fn delete_file(&self, id: &str) -> Result<()> {
            self.record_call(format!("delete {id}"));
            self.deletes.lock().unwrap().remove(0)
        }
    }

    fn names(view: &[&FileRecord]) -> Vec<String> {
        view.iter().map(|f| f.name.clone()).collect()
    }

    #[test]
    fn file_name_rules() {
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("   ").is_err());
        assert!(validate_file_name(&"a".repeat(256)).is_err());
        assert_eq!(validate_file_name(&"a".repeat(255)).unwrap().len(), 255);
        for c in FORBIDDEN_NAME_CHARS {
            assert!(validate_file_name(&format!("bad{c}name")).is_err(), "{c} accepted");
        }
        assert_eq!(validate_file_name("  report v2.pdf ").unwrap(), "report v2.pdf");
    }

    #[test]
    fn sort_by_parsing_falls_back_to_unsorted() {
        assert_eq!("Name".parse::<SortBy>().unwrap(), SortBy::Name);
        assert_eq!("size".parse::<SortBy>().unwrap(), SortBy::Size);
        assert_eq!("date".parse::<SortBy>().unwrap(), SortBy::Date);
        assert_eq!("colour".parse::<SortBy>().unwrap(), SortBy::Unsorted);
    }

    #[tokio::test]
    async fn uploads_are_prepended_and_views_sort() {
        let api = FakeApi::default();
        *api.uploads.lock().unwrap() = vec![
            Ok(record("a", "alpha.txt", 100, t(1))),
            Ok(record("b", "Beta.txt", 200, t(2))),
        ];
        let mut library = FileLibrary::new(api);

        library.upload(&UploadSource::new("alpha.txt", vec![1])).await.unwrap();
        library.upload(&UploadSource::new("Beta.txt", vec![1])).await.unwrap();

        assert_eq!(names(&library.records().iter().collect::<Vec<_>>()), ["Beta.txt", "alpha.txt"]);
        assert_eq!(names(&library.view("", SortBy::Date)), ["Beta.txt", "alpha.txt"]);
        assert_eq!(names(&library.view("", SortBy::Size)), ["Beta.txt", "alpha.txt"]);
        assert_eq!(names(&library.view("", SortBy::Name)), ["alpha.txt", "Beta.txt"]);
        assert_eq!(library.total_size(), 300);
    }

    #[test]
    fn name_order_ignores_case() {
        let library = FileLibrary::with_files(
            FakeApi::default(),
            vec![
                record("1", "zeta.txt", 1, t(1)),
                record("2", "Apple.txt", 1, t(2)),
                record("3", "apple.txt", 1, t(3)),
                record("4", "banana.txt", 1, t(4)),
            ],
        );

        assert_eq!(
            names(&library.view("", SortBy::Name)),
            ["Apple.txt", "apple.txt", "banana.txt", "zeta.txt"]
        );
    }

    #[tokio::test]
    async fn failed_upload_leaves_list_unchanged_and_stops_batch() {
        let api = FakeApi::default();
        *api.uploads.lock().unwrap() = vec![
            Ok(record("a", "a.txt", 1, t(1))),
            Err(Error::request_failed("File quá lớn")),
        ];
        let mut library = FileLibrary::new(api);
        let sources = [
            UploadSource::new("a.txt", vec![1]),
            UploadSource::new("b.txt", vec![1]),
            UploadSource::new("c.txt", vec![1]),
        ];

        let err = library.upload_all(&sources).await.unwrap_err();
        assert_eq!(err.to_string(), "File quá lớn");
        assert_eq!(library.len(), 1);
        assert_eq!(library.api().calls(), ["upload a.txt", "upload b.txt"]);
    }

    #[test]
    fn view_filters_case_insensitively_and_is_repeatable() {
        let library = FileLibrary::with_files(
            FakeApi::default(),
            vec![
                record("1", "Holiday.JPG", 10, t(1)),
                record("2", "notes.txt", 30, t(3)),
                record("3", "holiday-2.png", 20, t(2)),
            ],
        );

        let first = names(&library.view("HOLIDAY", SortBy::Size));
        let second = names(&library.view("HOLIDAY", SortBy::Size));
        assert_eq!(first, ["holiday-2.png", "Holiday.JPG"]);
        assert_eq!(first, second);
        assert_eq!(names(&library.view("", SortBy::Unsorted)), ["Holiday.JPG", "notes.txt", "holiday-2.png"]);
        assert_eq!(library.records()[0].id, "1");
    }

    #[tokio::test]
    async fn invalid_rename_makes_no_request() {
        let mut library =
            FileLibrary::with_files(FakeApi::default(), vec![record("a", "a.txt", 1, t(1))]);

        let err = library.rename("a", "dir/a.txt").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(library.records()[0].name, "a.txt");
        assert!(library.api().calls().is_empty());
    }

    #[tokio::test]
    async fn rename_replaces_in_place() {
        let api = FakeApi::default();
        *api.renames.lock().unwrap() = vec![Ok(record("b", "renamed.txt", 2, t(2)))];
        let mut library = FileLibrary::with_files(
            api,
            vec![
                record("a", "a.txt", 1, t(1)),
                record("b", "b.txt", 2, t(2)),
                record("c", "c.txt", 3, t(3)),
            ],
        );

        library.rename("b", "  renamed  ").await.unwrap();
        assert_eq!(library.records()[1].name, "renamed.txt");
        assert_eq!(library.len(), 3);
        assert_eq!(library.api().calls(), ["rename b renamed"]);
    }

    #[tokio::test]
    async fn rename_of_unknown_id_leaves_list_alone() {
        let api = FakeApi::default();
        *api.renames.lock().unwrap() = vec![Ok(record("zz", "ghost.txt", 9, t(9)))];
        let mut library = FileLibrary::with_files(api, vec![record("a", "a.txt", 1, t(1))]);

        let renamed = library.rename("zz", "ghost.txt").await.unwrap();
        assert_eq!(renamed.name, "ghost.txt");
        assert_eq!(library.len(), 1);
        assert_eq!(library.records()[0].id, "a");
        assert!(library.get("zz").is_none());
    }

    #[tokio::test]
    async fn failed_rename_and_delete_leave_list_unchanged() {
        let api = FakeApi::default();
        *api.renames.lock().unwrap() = vec![Err(Error::request_failed("Bạn không có quyền"))];
        *api.deletes.lock().unwrap() = vec![Err(Error::request_failed("Network error"))];
        let original = vec![record("a", "a.txt", 1, t(1))];
        let mut library = FileLibrary::with_files(api, original.clone());

        assert!(library.rename("a", "b.txt").await.is_err());
        assert!(library.delete("a").await.is_err());
        assert_eq!(library.records(), original.as_slice());
    }

    #[tokio::test]
    async fn delete_removes_only_on_success() {
        let api = FakeApi::default();
        *api.deletes.lock().unwrap() = vec![Ok(())];
        let mut library = FileLibrary::with_files(
            api,
            vec![record("a", "a.txt", 1, t(1)), record("b", "b.txt", 2, t(2))],
        );

        library.delete("a").await.unwrap();
        assert!(library.get("a").is_none());
        assert!(library.get("b").is_some());
    }

    #[tokio::test]
    async fn refresh_failure_keeps_previous_list() {
        let api = FakeApi::default();
        *api.listing.lock().unwrap() = Some(Err(Error::request_failed("Network error")));
        let mut library = FileLibrary::with_files(api, vec![record("a", "a.txt", 1, t(1))]);

        assert!(library.refresh().await.is_err());
        assert_eq!(library.len(), 1);

        library.refresh().await.unwrap();
        assert!(library.is_empty());
    }

    #[test]
    fn file_sizes_are_human_readable() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2 * 1024 * 1024), "2 MB");
        assert_eq!(format_file_size(1_288_490_189), "1.2 GB");
    }
}
