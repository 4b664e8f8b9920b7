//! WiFi 凭据存储
//!
//! 在 NVS 命名空间上封装 `ssid` / `password` 两个字符串键。
//! 两个键要么同时存在，要么都不存在。

pub const SSID_KEY: &str = "ssid";
pub const PASSWORD_KEY: &str = "password";

/// 存储错误类型
#[derive(Debug)]
pub enum StoreError {
    /// 打开命名空间失败
    Open(String),
    /// 读取失败
    Read(String),
    /// 写入失败
    Write(String),
    /// 删除失败
    Erase(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Open(msg) => write!(f, "failed to open namespace: {}", msg),
            StoreError::Read(msg) => write!(f, "failed to read: {}", msg),
            StoreError::Write(msg) => write!(f, "failed to write: {}", msg),
            StoreError::Erase(msg) => write!(f, "failed to erase: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// 单个命名空间内的字符串键值操作
pub trait KvStore {
    fn has_key(&self, key: &str) -> Result<bool, StoreError>;
    fn read_str(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn write_str(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn erase(&mut self, key: &str) -> Result<bool, StoreError>;

    /// NVS 每次写入都会 commit，默认无事可做
    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// 可以按名字打开命名空间的持久化分区
pub trait KvPartition {
    type Namespace: KvStore;

    fn open(&self, namespace: &str) -> Result<Self::Namespace, StoreError>;
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

impl Credentials {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 密码脱敏显示
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"*".repeat(self.password.len().min(8)))
            .finish()
    }
}

pub struct CredentialStore<N: KvStore> {
    namespace: String,
    kv: N,
}

impl<N: KvStore> CredentialStore<N> {
    pub fn open<P>(partition: &P, namespace: &str) -> Result<Self, StoreError>
    where
        P: KvPartition<Namespace = N>,
    {
        let kv = partition.open(namespace)?;
        log::info!("Opened credential namespace {:?}", namespace);
        Ok(Self {
            namespace: namespace.to_string(),
            kv,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// 两个键都存在即视为已配置，不检查值是否为空。
    /// 读取失败按不存在处理，设备会进入配网模式。
    pub fn has_credentials(&self) -> bool {
        self.contains(SSID_KEY) && self.contains(PASSWORD_KEY)
    }

    fn contains(&self, key: &str) -> bool {
        self.kv
            .has_key(key)
            .map_err(|e| log::error!("Failed to check {}: {}", key, e))
            .unwrap_or(false)
    }

    pub fn get(&self, key: &str, default: &str) -> String {
        self.kv
            .read_str(key)
            .map_err(|e| log::error!("Failed to get {}: {}", key, e))
            .ok()
            .flatten()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn put(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.kv.write_str(key, value)
    }

    pub fn ssid(&self) -> String {
        self.get(SSID_KEY, "")
    }

    pub fn password(&self) -> String {
        self.get(PASSWORD_KEY, "")
    }

    pub fn load(&self) -> Option<Credentials> {
        if !self.has_credentials() {
            return None;
        }
        Some(Credentials::new(self.ssid(), self.password()))
    }

    /// 先写 ssid 再写 password；password 写入失败时回滚 ssid，
    /// 保证重启后不会留下只有一半的凭据。
    pub fn save(&mut self, credentials: &Credentials) -> Result<(), StoreError> {
        self.put(SSID_KEY, &credentials.ssid)?;

        if let Err(e) = self.put(PASSWORD_KEY, &credentials.password) {
            log::error!("Failed to save password, rolling back ssid: {}", e);
            if let Err(e) = self.kv.erase(SSID_KEY) {
                log::error!("Failed to roll back ssid: {}", e);
            }
            return Err(e);
        }

        log::info!("Saved credentials for SSID {:?}", credentials.ssid);
        Ok(())
    }

    /// 恢复出厂：命名空间里只有这两个键，逐个删除即清空
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.kv.erase(PASSWORD_KEY)?;
        self.kv.erase(SSID_KEY)?;
        log::info!("Cleared credential namespace {:?}", self.namespace);
        Ok(())
    }

    /// 提交并释放命名空间。按值消费，不能重复关闭。
    pub fn close(mut self) -> Result<(), StoreError> {
        self.kv.flush()?;
        log::info!("Closed credential namespace {:?}", self.namespace);
        Ok(())
    }
}


#[cfg(test)]
pub use memory::{MemoryNamespace, MemoryPartition};

#[cfg(target_os = "espidf")]
mod nvs {
    use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

    use super::{KvPartition, KvStore, StoreError};

    impl KvPartition for EspDefaultNvsPartition {
        type Namespace = EspNvs<NvsDefault>;

        fn open(&self, namespace: &str) -> Result<Self::Namespace, StoreError> {
            EspNvs::new(self.clone(), namespace, true)
                .map_err(|e| StoreError::Open(format!("{:?}", e)))
        }
    }

    impl KvStore for EspNvs<NvsDefault> {
        fn has_key(&self, key: &str) -> Result<bool, StoreError> {
            self.contains(key)
                .map_err(|e| StoreError::Read(format!("{:?}", e)))
        }

        fn read_str(&self, key: &str) -> Result<Option<String>, StoreError> {
            let len = self
                .str_len(key)
                .map_err(|e| StoreError::Read(format!("{:?}", e)))?;
            let Some(len) = len else {
                return Ok(None);
            };

            let mut buf = vec![0u8; len + 1];
            let value = self
                .get_str(key, &mut buf)
                .map_err(|e| StoreError::Read(format!("{:?}", e)))?;
            Ok(value.map(str::to_string))
        }

        fn write_str(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
            self.set_str(key, value)
                .map_err(|e| StoreError::Write(format!("{:?}", e)))
        }

        fn erase(&mut self, key: &str) -> Result<bool, StoreError> {
            self.remove(key)
                .map_err(|e| StoreError::Erase(format!("{:?}", e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(partition: &MemoryPartition) -> CredentialStore<MemoryNamespace> {
        CredentialStore::open(partition, "wifi").unwrap()
    }

    #[test]
    fn test_empty_namespace_has_no_credentials() {
        let partition = MemoryPartition::new();
        let store = open(&partition);
        assert!(!store.has_credentials());
        assert_eq!(store.load(), None);
        assert_eq!(store.ssid(), "");
    }

    #[test]
    fn test_save_and_reopen() {
        let partition = MemoryPartition::new();
        let mut store = open(&partition);
        store
            .save(&Credentials::new("MyNet", "secret123"))
            .unwrap();
        store.close().unwrap();

        let store = open(&partition);
        assert!(store.has_credentials());
        assert_eq!(store.ssid(), "MyNet");
        assert_eq!(store.password(), "secret123");
        assert_eq!(store.load(), Some(Credentials::new("MyNet", "secret123")));
    }

    #[test]
    fn test_has_credentials_requires_both_keys() {
        let partition = MemoryPartition::new();
        let mut store = open(&partition);
        store.put(SSID_KEY, "MyNet").unwrap();
        assert!(!store.has_credentials());
        store.put(PASSWORD_KEY, "secret123").unwrap();
        assert!(store.has_credentials());
    }

    #[test]
    fn test_empty_values_count_as_present() {
        let partition = MemoryPartition::new();
        let mut store = open(&partition);
        store.put(SSID_KEY, "").unwrap();
        store.put(PASSWORD_KEY, "").unwrap();
        assert!(store.has_credentials());
        assert!(store.has_credentials());
    }

    #[test]
    fn test_get_default() {
        let partition = MemoryPartition::new();
        let store = open(&partition);
        assert_eq!(store.get("missing", "fallback"), "fallback");
    }

    #[test]
    fn test_clear() {
        let partition = MemoryPartition::new();
        let mut store = open(&partition);
        store.save(&Credentials::new("MyNet", "secret123")).unwrap();
        store.clear().unwrap();
        assert!(!store.has_credentials());
        assert!(partition.snapshot("wifi").is_empty());
    }

    #[test]
    fn test_password_failure_rolls_back_ssid() {
        let partition = MemoryPartition::new();
        partition.fail_writes_to(PASSWORD_KEY);
        let mut store = open(&partition);

        let err = store
            .save(&Credentials::new("MyNet", "secret123"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Write(_)));
        assert!(!store.has_credentials());
        assert!(partition.snapshot("wifi").is_empty());
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let partition = MemoryPartition::new();
        let mut store = open(&partition);
        store.save(&Credentials::new("MyNet", "secret123")).unwrap();

        let other: CredentialStore<MemoryNamespace> =
            CredentialStore::open(&partition, "other").unwrap();
        assert!(!other.has_credentials());
        assert_eq!(other.namespace(), "other");
    }

    #[test]
    fn test_debug_masks_password() {
        let creds = Credentials::new("MyNet", "secret123");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("MyNet"));
        assert!(!debug.contains("secret123"));
    }
}
