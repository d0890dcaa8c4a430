//! Persistence for leave requests.
//!
//! Documents live CBOR-encoded in one sled tree keyed by leave id, with a
//! second tree indexing `student id / leave id` and a third holding a
//! per-student version that every create bumps. Because the encoding is
//! deterministic, the stored bytes of a document identify that exact revision,
//! and every state change is conditional on the bytes the caller checked. A
//! writer that lost the race sees `InvalidTransition`.
use super::error::{LeaveError, LeaveResult};
use super::leave::{LeaveRequest, LeaveStatus};
use sled::transaction::{ConflictableTransactionError, abort};
use sled::{Db, Transactional, Tree};

const LEAVE_TREE: &str = "leave_requests";
const STUDENT_INDEX_TREE: &str = "leave_by_student";
const STUDENT_VERSION_TREE: &str = "leave_student_versions";

pub(crate) fn to_cbor<T: minicbor::Encode<()>>(value: &T) -> LeaveResult<Vec<u8>> {
    minicbor::to_vec(value).map_err(|e| LeaveError::Internal(e.to_string()))
}

fn student_key(student: &str, leave_id: &str) -> Vec<u8> {
    let mut key = student_prefix(student);
    key.extend_from_slice(leave_id.as_bytes());
    key
}

fn student_prefix(student: &str) -> Vec<u8> {
    let mut key = student.as_bytes().to_vec();
    key.push(b'/');
    key
}

// big-endian u64, absent means no request was ever created
fn decode_version(bytes: Option<&[u8]>) -> LeaveResult<u64> {
    match bytes {
        None => Ok(0),
        Some(bytes) => bytes
            .try_into()
            .map(u64::from_be_bytes)
            .map_err(|_| LeaveError::Internal("corrupt student version".into())),
    }
}

#[derive(Clone)]
pub struct LeaveStore {
    leaves: Tree,
    by_student: Tree,
    versions: Tree,
}

impl LeaveStore {
    pub fn open(db: &Db) -> LeaveResult<Self> {
        Ok(Self {
            leaves: db.open_tree(LEAVE_TREE)?,
            by_student: db.open_tree(STUDENT_INDEX_TREE)?,
            versions: db.open_tree(STUDENT_VERSION_TREE)?,
        })
    }

    /// Read before checking a new request against the student's existing
    /// ones, then handed back to [`Self::create`].
    pub fn student_version(&self, student: &str) -> LeaveResult<u64> {
        decode_version(self.versions.get(student.as_bytes())?.as_deref())
    }

    /// Persist a new document and its index entry in one transaction.
    ///
    /// Returns `false` and writes nothing when another request for the same
    /// student was created after `seen` was read. The id must not already
    /// exist.
    pub fn create(&self, leave: &LeaveRequest, seen: u64) -> LeaveResult<bool> {
        let bytes = to_cbor(leave)?;
        let index_key = student_key(&leave.student, &leave.id);
        let next = (seen + 1).to_be_bytes();

        let created = (&self.leaves, &self.by_student, &self.versions).transaction(
            |(leaves, by_student, versions)| {
                let current = decode_version(versions.get(leave.student.as_bytes())?.as_deref())
                    .map_err(ConflictableTransactionError::Abort)?;
                if current != seen {
                    return Ok(false);
                }
                if leaves.get(leave.id.as_bytes())?.is_some() {
                    return abort(LeaveError::Conflict(format!(
                        "leave request {} already exists",
                        leave.id
                    )));
                }
                leaves.insert(leave.id.as_bytes(), bytes.as_slice())?;
                by_student.insert(index_key.as_slice(), leave.id.as_bytes())?;
                versions.insert(leave.student.as_bytes(), &next[..])?;
                Ok(true)
            },
        )?;
        Ok(created)
    }

    pub fn find_by_id(&self, id: &str) -> LeaveResult<Option<LeaveRequest>> {
        match self.leaves.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Like [`Self::find_by_id`] but absence is an error
    pub fn get(&self, id: &str) -> LeaveResult<LeaveRequest> {
        self.find_by_id(id)?
            .ok_or_else(|| LeaveError::NotFound(format!("leave request {id}")))
    }

    /// All of a student's requests, newest first
    pub fn find_by_student(&self, student: &str) -> LeaveResult<Vec<LeaveRequest>> {
        let mut found = Vec::new();
        for entry in self.by_student.scan_prefix(student_prefix(student)) {
            let (_, leave_id) = entry?;
            if let Some(bytes) = self.leaves.get(&leave_id)? {
                found.push(minicbor::decode::<LeaveRequest>(&bytes)?);
            }
        }
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    /// Pending requests, earliest start first
    pub fn find_pending(&self) -> LeaveResult<Vec<LeaveRequest>> {
        let mut pending: Vec<_> = self
            .all()?
            .into_iter()
            .filter(|leave| leave.status == LeaveStatus::Pending)
            .collect();
        pending.sort_by(|a, b| a.from_date.cmp(&b.from_date));
        Ok(pending)
    }

    pub fn all(&self) -> LeaveResult<Vec<LeaveRequest>> {
        self.leaves
            .iter()
            .map(|entry| -> LeaveResult<LeaveRequest> {
                let (_, bytes) = entry?;
                Ok(minicbor::decode(&bytes)?)
            })
            .collect()
    }

    /// Replace `current` with `updated` only if the stored document is still
    /// exactly `current`.
    pub fn update_status(&self, current: &LeaveRequest, updated: &LeaveRequest) -> LeaveResult<()> {
        let swapped = self.leaves.compare_and_swap(
            current.id.as_bytes(),
            Some(to_cbor(current)?),
            Some(to_cbor(updated)?),
        )?;
        swapped.map_err(|_| stale(&current.id))
    }

    /// Remove `current` and its index entry only if the stored document is
    /// still exactly `current`
    pub fn delete(&self, current: &LeaveRequest) -> LeaveResult<()> {
        let expected = to_cbor(current)?;
        let index_key = student_key(&current.student, &current.id);

        (&self.leaves, &self.by_student).transaction(|(leaves, by_student)| {
            match leaves.get(current.id.as_bytes())? {
                Some(stored) if stored[..] == expected[..] => {}
                _ => return abort(stale(&current.id)),
            }
            leaves.remove(current.id.as_bytes())?;
            by_student.remove(index_key.as_slice())?;
            Ok(())
        })?;
        Ok(())
    }
}

fn stale(id: &str) -> LeaveError {
    LeaveError::InvalidTransition(format!(
        "leave request {id} was modified concurrently"
    ))
}
