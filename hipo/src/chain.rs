// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Reading several files as one sequence of events.

use crate::{
    HipoResult,
    batch::{Batches, DEFAULT_STEP},
    error::Details,
    event::Event,
    file::open_source,
    reader::Reader,
};
use log::{debug, warn};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    vec,
};

/// An ordered list of files read one after the other.
///
/// ```no_run
/// # use hipo::Chain;
/// # fn main() -> Result<(), hipo::Error> {
/// let chain = Chain::builder()
///     .patterns(vec!["run_*.hipo".to_owned()])
///     .banks(vec!["REC::Particle".to_owned()])
///     .step(1000)
///     .build()?;
/// for batch in chain.batches()? {
///     let batch = batch?;
///     println!("{} events, keys {:?}", batch.len(), batch.keys().collect::<Vec<_>>());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Chain {
    files: Vec<PathBuf>,
    banks: Option<Vec<String>>,
    step: usize,
    tags: Vec<u32>,
}

#[bon::bon]
impl Chain {
    /// Expand `patterns` into the files of the chain.
    ///
    /// Each pattern contributes its matches in sorted order. A pattern matching nothing is
    /// skipped with a warning.
    #[builder]
    pub fn builder(
        patterns: Vec<String>,
        banks: Option<Vec<String>>,
        #[builder(default = DEFAULT_STEP)] step: usize,
        #[builder(default)] tags: Vec<u32>,
    ) -> HipoResult<Self> {
        if step == 0 {
            return Err(Details::InvalidStep.into());
        }
        let mut files = Vec::new();
        for pattern in &patterns {
            let matches = expand(pattern)?;
            if matches.is_empty() {
                warn!("Pattern '{pattern}' does not match any file");
            }
            files.extend(matches);
        }
        Ok(Self {
            files,
            banks,
            step,
            tags,
        })
    }
}

impl Chain {
    /// A chain over exactly these files, in this order.
    pub fn from_files(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            banks: None,
            step: DEFAULT_STEP,
            tags: Vec::new(),
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Every event of every file, in file order.
    pub fn events(&self) -> ChainedEvents {
        ChainedEvents {
            files: self.files.clone().into_iter(),
            banks: self.banks.clone(),
            tags: self.tags.clone(),
            current: None,
            errored: false,
        }
    }

    /// The events of the chain grouped by `step`.
    pub fn batches(&self) -> HipoResult<Batches<ChainedEvents>> {
        Batches::new(self.events(), self.step, None)
    }
}

fn expand(pattern: &str) -> HipoResult<Vec<PathBuf>> {
    let paths = glob::glob(pattern).map_err(|source| Details::GlobPattern {
        pattern: pattern.to_owned(),
        source,
    })?;
    let mut matches = paths
        .map(|entry| entry.map_err(Details::GlobEntry))
        .collect::<Result<Vec<_>, _>>()?;
    matches.sort();
    Ok(matches)
}

/// The events of a [`Chain`], opening each file when the previous one is exhausted.
///
/// The iteration stops after the first error.
pub struct ChainedEvents {
    files: vec::IntoIter<PathBuf>,
    banks: Option<Vec<String>>,
    tags: Vec<u32>,
    current: Option<Reader<BufReader<File>>>,
    errored: bool,
}

impl ChainedEvents {
    fn open(&self, path: &Path) -> HipoResult<Reader<BufReader<File>>> {
        Reader::builder(open_source(path)?)
            .maybe_banks(self.banks.clone())
            .tags(self.tags.clone())
            .build()
    }
}

impl Iterator for ChainedEvents {
    type Item = HipoResult<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.errored {
            return None;
        }
        loop {
            if let Some(reader) = self.current.as_mut() {
                match reader.next() {
                    Some(Ok(event)) => return Some(Ok(event)),
                    Some(Err(e)) => {
                        self.errored = true;
                        return Some(Err(e));
                    }
                    None => self.current = None,
                }
            }
            let path = self.files.next()?;
            debug!("Switching to {}", path.display());
            match self.open(&path) {
                Ok(reader) => self.current = Some(reader),
                Err(e) => {
                    self.errored = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
