pub struct Config {
    pub base_url: String,
    pub data_dir: String,
    pub checkpoint_dir: String,
    pub db_path: Option<String>,
    pub page_size: usize,
    pub request_timeout_secs: u64,
    pub settle_ms: u64,
}

impl Config {
    pub fn new() -> Self {
        Self {
            base_url: "https://www.nepalstock.com.np/api/nots".to_string(),
            data_dir: "data".to_string(),
            checkpoint_dir: "data".to_string(),
            db_path: None,
            page_size: 500,
            request_timeout_secs: 30,
            settle_ms: 2000,
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    pub fn with_data_dir(mut self, dir: &str) -> Self {
        self.data_dir = dir.to_string();
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: &str) -> Self {
        self.checkpoint_dir = dir.to_string();
        self
    }

    pub fn with_db_path(mut self, path: Option<String>) -> Self {
        self.db_path = path;
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    pub fn with_settle_ms(mut self, ms: u64) -> Self {
        self.settle_ms = ms;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
