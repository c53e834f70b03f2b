use super::*;

/// How many completed checkpoints survive subsumption. Savepoints are
/// exempt either way: they never count against the limit and are never
/// evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointRetentionPolicy {
    /// Keep the newest `n` regular checkpoints; older ones are subsumed.
    RetainLast(usize),
    /// Keep everything.
    RetainAll,
}

impl Default for CheckpointRetentionPolicy {
    fn default() -> Self {
        CheckpointRetentionPolicy::RetainLast(3)
    }
}

/// Ordered registry of completed checkpoints, newest last.
///
/// Adding a checkpoint reports which older ones it subsumed so the caller
/// can release their external artifacts; the store itself never touches
/// storage.
#[derive(Debug, Default)]
pub struct CompletedCheckpointStore {
    policy: CheckpointRetentionPolicy,
    checkpoints: VecDeque<Arc<CompletedCheckpoint>>,
}

impl CompletedCheckpointStore {
    pub fn new(policy: CheckpointRetentionPolicy) -> Self {
        let policy = match policy {
            // Retaining zero checkpoints would make every restore fail.
            CheckpointRetentionPolicy::RetainLast(n) => {
                CheckpointRetentionPolicy::RetainLast(n.max(1))
            }
            keep_all => keep_all,
        };
        Self {
            policy,
            checkpoints: VecDeque::new(),
        }
    }

    /// Registers a newly completed checkpoint and returns it together with
    /// the checkpoints it subsumed, oldest first.
    pub fn add(
        &mut self,
        checkpoint: CompletedCheckpoint,
    ) -> (Arc<CompletedCheckpoint>, Vec<Arc<CompletedCheckpoint>>) {
        let retained = Arc::new(checkpoint);
        self.checkpoints.push_back(Arc::clone(&retained));

        let mut subsumed = Vec::new();
        if let CheckpointRetentionPolicy::RetainLast(keep) = self.policy {
            while self.num_regular_checkpoints() > keep {
                if let Some(idx) = self.checkpoints.iter().position(|c| !c.is_savepoint()) {
                    if let Some(old) = self.checkpoints.remove(idx) {
                        subsumed.push(old);
                    }
                } else {
                    break;
                }
            }
        }
        (retained, subsumed)
    }

    /// The most recent completed checkpoint or savepoint.
    pub fn latest(&self) -> Option<Arc<CompletedCheckpoint>> {
        self.checkpoints.back().cloned()
    }

    pub fn get(&self, checkpoint_id: CheckpointId) -> Option<Arc<CompletedCheckpoint>> {
        self.checkpoints
            .iter()
            .find(|c| c.checkpoint_id == checkpoint_id)
            .cloned()
    }

    pub fn checkpoint_ids(&self) -> Vec<CheckpointId> {
        self.checkpoints.iter().map(|c| c.checkpoint_id).collect()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    fn num_regular_checkpoints(&self) -> usize {
        self.checkpoints.iter().filter(|c| !c.is_savepoint()).count()
    }
}

/// Where completed-checkpoint metadata lives outside the coordinator's
/// memory. `location` names the spot before anything is written so the
/// completed metadata can record where it went.
pub trait CheckpointStorage: Send + Sync {
    fn location(&self, checkpoint_id: CheckpointId) -> String;
    fn persist(&self, checkpoint: &CompletedCheckpoint) -> Result<()>;
    fn load(&self, checkpoint_id: CheckpointId) -> Result<CompletedCheckpoint>;
    fn list(&self) -> Result<Vec<CheckpointId>>;
    fn discard(&self, checkpoint_id: CheckpointId) -> Result<()>;
}

/// Keeps checkpoint metadata in memory. For tests and single-process runs.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStorage {
    checkpoints: Mutex<HashMap<CheckpointId, CompletedCheckpoint>>,
}

impl InMemoryCheckpointStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStorage for InMemoryCheckpointStorage {
    fn location(&self, checkpoint_id: CheckpointId) -> String {
        format!("memory://chk-{checkpoint_id}")
    }

    fn persist(&self, checkpoint: &CompletedCheckpoint) -> Result<()> {
        let mut checkpoints = self
            .checkpoints
            .lock()
            .map_err(|_| anyhow!("checkpoint storage lock poisoned"))?;
        checkpoints.insert(checkpoint.checkpoint_id, checkpoint.clone());
        Ok(())
    }

    fn load(&self, checkpoint_id: CheckpointId) -> Result<CompletedCheckpoint> {
        let checkpoints = self
            .checkpoints
            .lock()
            .map_err(|_| anyhow!("checkpoint storage lock poisoned"))?;
        checkpoints
            .get(&checkpoint_id)
            .cloned()
            .ok_or_else(|| anyhow!("checkpoint {checkpoint_id} not found in storage"))
    }

    fn list(&self) -> Result<Vec<CheckpointId>> {
        let checkpoints = self
            .checkpoints
            .lock()
            .map_err(|_| anyhow!("checkpoint storage lock poisoned"))?;
        let mut ids: Vec<_> = checkpoints.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    fn discard(&self, checkpoint_id: CheckpointId) -> Result<()> {
        let mut checkpoints = self
            .checkpoints
            .lock()
            .map_err(|_| anyhow!("checkpoint storage lock poisoned"))?;
        checkpoints.remove(&checkpoint_id);
        Ok(())
    }
}

/// Writes checkpoint metadata to `base_path/chk-{id}/metadata.bin` with
/// bincode.
#[derive(Debug, Clone)]
pub struct FsCheckpointStorage {
    base_path: PathBuf,
}

impl FsCheckpointStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)
            .with_context(|| format!("failed to create checkpoint directory {base_path:?}"))?;
        Ok(Self { base_path })
    }

    fn checkpoint_dir(&self, checkpoint_id: CheckpointId) -> PathBuf {
        self.base_path.join(format!("chk-{checkpoint_id}"))
    }

    fn metadata_path(&self, checkpoint_id: CheckpointId) -> PathBuf {
        self.checkpoint_dir(checkpoint_id).join("metadata.bin")
    }
}

impl CheckpointStorage for FsCheckpointStorage {
    fn location(&self, checkpoint_id: CheckpointId) -> String {
        self.checkpoint_dir(checkpoint_id).display().to_string()
    }

    fn persist(&self, checkpoint: &CompletedCheckpoint) -> Result<()> {
        let dir = self.checkpoint_dir(checkpoint.checkpoint_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create checkpoint directory {dir:?}"))?;
        let bytes = bincode::serialize(checkpoint).context("failed to encode checkpoint metadata")?;
        let path = self.metadata_path(checkpoint.checkpoint_id);
        fs::write(&path, bytes)
            .with_context(|| format!("failed to write checkpoint metadata {path:?}"))?;
        Ok(())
    }

    fn load(&self, checkpoint_id: CheckpointId) -> Result<CompletedCheckpoint> {
        let path = self.metadata_path(checkpoint_id);
        let bytes = fs::read(&path)
            .with_context(|| format!("failed to read checkpoint metadata {path:?}"))?;
        bincode::deserialize(&bytes).context("failed to decode checkpoint metadata")
    }

    fn list(&self) -> Result<Vec<CheckpointId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.base_path)
            .with_context(|| format!("failed to list checkpoint directory {:?}", self.base_path))?
        {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name.strip_prefix("chk-") {
                if let Ok(id) = id.parse::<CheckpointId>() {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn discard(&self, checkpoint_id: CheckpointId) -> Result<()> {
        let dir = self.checkpoint_dir(checkpoint_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("failed to remove checkpoint directory {dir:?}"))?;
        }
        Ok(())
    }
}
