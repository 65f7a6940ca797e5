//! Durable storage: one binary file per closed day, a users file, and a small
//! recovery-state record. Every operation is serialized by a single lock;
//! rotation is rare next to queries, so durability is allowed to be a
//! contention point.
//!
//! Day file layout (big-endian): day number (u32), closed flag (u8), event
//! count (u32), then each event as (product, quantity, price).

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use itertools::Itertools as _;

use crate::encoding;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::series::DaySeries;
use crate::users::User;

const DAY_FILE_PREFIX: &str = "day_";
const DAY_FILE_SUFFIX: &str = ".dat";

/// Recovery record: enough to resume the day counter after a restart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryState {
    pub current_day_number: u32,
    pub retention_days: u32,
    pub resident_limit: u32,
}

#[derive(Debug)]
pub struct PersistenceManager {
    series_dir: PathBuf,
    users_file: PathBuf,
    state_file: PathBuf,
    lock: Mutex<()>,
}

impl PersistenceManager {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let series_dir = dir.join("series");
        fs::create_dir_all(&series_dir)?;

        Ok(Self {
            series_dir,
            users_file: dir.join("users.dat"),
            state_file: dir.join("state.dat"),
            lock: Mutex::new(()),
        })
    }

    fn day_path(&self, day_number: u32) -> PathBuf {
        self.series_dir
            .join(format!("{}{}{}", DAY_FILE_PREFIX, day_number, DAY_FILE_SUFFIX))
    }

    /// Writes a whole day to its file, replacing any previous copy.
    pub fn write_day(&self, day: &DaySeries) -> Result<()> {
        let _guard = self.lock.lock().unwrap();

        let file = File::create(self.day_path(day.day_number()))?;
        let mut w = BufWriter::new(file);

        let events = day.events();
        encoding::write_u32(&mut w, day.day_number())?;
        encoding::write_bool(&mut w, day.is_closed())?;
        encoding::write_u32(&mut w, events.len() as u32)?;
        for event in &events {
            event.encode(&mut w)?;
        }

        use std::io::Write as _;
        w.flush()?;
        w.into_inner()
            .map_err(|e| Error::IoError(e.into_error()))?
            .sync_all()?;
        Ok(())
    }

    /// Reads a whole day back into memory. Returns None when no file exists.
    pub fn read_day(&self, day_number: u32) -> Result<Option<DaySeries>> {
        let _guard = self.lock.lock().unwrap();

        let file = match File::open(self.day_path(day_number)) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::IoError(e)),
        };
        let mut r = BufReader::new(file);

        let stored_number = encoding::read_u32(&mut r)?;
        if stored_number != day_number {
            return Err(Error::Corrupted(format!(
                "day file {} claims day {}",
                day_number, stored_number
            )));
        }
        let closed = encoding::read_bool(&mut r)?;
        let count = encoding::read_u32(&mut r)?;

        let mut events = Vec::with_capacity(count as usize);
        for _ in 0..count {
            events.push(Event::decode(&mut r)?);
        }

        let day = if closed {
            DaySeries::from_events(day_number, events)
        } else {
            let day = DaySeries::new(day_number);
            for event in events {
                day.add_event(event);
            }
            day
        };
        Ok(Some(day))
    }

    /// Streams a day's events through the callback without materializing a
    /// DaySeries, which is the cold query path. A missing file is a no-op.
    pub fn stream_events<F>(&self, day_number: u32, mut f: F) -> Result<()>
    where
        F: FnMut(&Event),
    {
        let _guard = self.lock.lock().unwrap();

        let file = match File::open(self.day_path(day_number)) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::IoError(e)),
        };
        let mut r = BufReader::new(file);

        encoding::read_u32(&mut r)?; // day number
        encoding::read_bool(&mut r)?; // closed flag
        let count = encoding::read_u32(&mut r)?;

        for _ in 0..count {
            let event = Event::decode(&mut r)?;
            f(&event);
        }
        Ok(())
    }

    pub fn day_exists(&self, day_number: u32) -> bool {
        self.day_path(day_number).exists()
    }

    pub fn delete_day(&self, day_number: u32) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        match fs::remove_file(self.day_path(day_number)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::IoError(e)),
        }
    }

    /// All persisted day numbers in ascending order, for audit and repair.
    pub fn list_days(&self) -> Result<Vec<u32>> {
        let _guard = self.lock.lock().unwrap();

        let days = fs::read_dir(&self.series_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                let number = name
                    .strip_prefix(DAY_FILE_PREFIX)?
                    .strip_suffix(DAY_FILE_SUFFIX)?;
                number.parse::<u32>().ok()
            })
            .sorted()
            .collect();
        Ok(days)
    }

    pub fn save_users(&self, users: &HashMap<String, User>) -> Result<()> {
        let _guard = self.lock.lock().unwrap();

        let file = File::create(&self.users_file)?;
        let mut w = BufWriter::new(file);

        encoding::write_u32(&mut w, users.len() as u32)?;
        for user in users.values() {
            encoding::write_str(&mut w, user.username())?;
            encoding::write_str(&mut w, user.password())?;
        }

        use std::io::Write as _;
        w.flush()?;
        Ok(())
    }

    pub fn load_users(&self) -> Result<HashMap<String, User>> {
        let _guard = self.lock.lock().unwrap();

        let file = match File::open(&self.users_file) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(Error::IoError(e)),
        };
        let mut r = BufReader::new(file);

        let count = encoding::read_u32(&mut r)?;
        let mut users = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let username = encoding::read_str(&mut r)?;
            let password = encoding::read_str(&mut r)?;
            users.insert(username.clone(), User::new(username, password));
        }
        Ok(users)
    }

    pub fn save_state(&self, state: RecoveryState) -> Result<()> {
        let _guard = self.lock.lock().unwrap();

        let file = File::create(&self.state_file)?;
        let mut w = BufWriter::new(file);
        encoding::write_u32(&mut w, state.current_day_number)?;
        encoding::write_u32(&mut w, state.retention_days)?;
        encoding::write_u32(&mut w, state.resident_limit)?;

        use std::io::Write as _;
        w.flush()?;
        w.into_inner()
            .map_err(|e| Error::IoError(e.into_error()))?
            .sync_all()?;
        Ok(())
    }

    /// Returns None when no state was ever persisted.
    pub fn load_state(&self) -> Result<Option<RecoveryState>> {
        let _guard = self.lock.lock().unwrap();

        let file = match File::open(&self.state_file) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::IoError(e)),
        };
        let mut r = BufReader::new(file);

        Ok(Some(RecoveryState {
            current_day_number: encoding::read_u32(&mut r)?,
            retention_days: encoding::read_u32(&mut r)?,
            resident_limit: encoding::read_u32(&mut r)?,
        }))
    }

    /// Removes every persisted file. Mainly for tests and manual resets.
    pub fn clear_all(&self) -> Result<()> {
        let _guard = self.lock.lock().unwrap();

        for entry in fs::read_dir(&self.series_dir)? {
            let entry = entry?;
            fs::remove_file(entry.path())?;
        }
        for file in [&self.users_file, &self.state_file] {
            match fs::remove_file(file) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(Error::IoError(e)),
            }
        }
        Ok(())
    }
}
