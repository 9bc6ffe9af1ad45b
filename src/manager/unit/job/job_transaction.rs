use super::job_alloc::JobAlloc;
use super::job_entry::{self, Job, JobConf, JobKind, JobState};
use super::job_manager::JobAffect;
use super::job_notify::JobNotifier;
use super::job_table::JobTable;
use super::JobErrno;
use crate::manager::data::JobMode;
use crate::manager::unit::unit_datastore::UnitDb;
use crate::manager::unit::unit_entry::UnitX;
use crate::manager::unit::unit_relation_atom::UnitRelationAtom;
use std::collections::HashMap;
use std::rc::Rc;

/// handle to a prospective job inside one transaction
#[derive(Eq, PartialEq, Clone, Copy, Debug, Hash)]
pub struct JobIdx(u32);

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
struct DepIdx(u32);

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
enum WalkState {
    Unvisited,
    OnPath,
    Done,
}

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
enum OrdWalk {
    Clean,
    Again,
}

/// a node in the ordering graph: a prospective job or an installed one
#[derive(Eq, PartialEq, Clone, Copy, Debug, Hash)]
enum OrdNode {
    Trans(JobIdx),
    Installed(u32),
}

/// a prospective job; lives in the transaction's arena until applied or freed
struct TransJob {
    unit: Rc<UnitX>,
    kind: JobKind,
    irreversible: bool,
    ignore_order: bool,
    matters_to_anchor: bool,

    // cycle-sweep scratch
    generation: u32,
    walk: WalkState,
    pred: Option<OrdNode>,

    // edges this job is the subject of (it pulled the object in)
    subjects: Vec<DepIdx>,
    // edges this job is the object of (the subject pulled it in)
    objects: Vec<DepIdx>,

    alive: bool,
}

/// `matters`: the subject's success requires the object's success.
/// `conflicts`: the object was pulled in because it conflicts with the subject.
struct TransDep {
    subject: JobIdx,
    object: JobIdx,
    matters: bool,
    conflicts: bool,
}

/// A transaction: the prospective job graph between construction and apply.
///
/// Jobs and edges live in arenas addressed by small indices; deleting a job
/// tombstones its slot and detaches every incident edge, so an index that was
/// handed out stays valid for the transaction's lifetime. Sibling lists (one
/// per unit) and the unit scan order are insertion-ordered to keep every
/// reduction pass reproducible.
pub struct JobTransaction {
    jobs: Vec<TransJob>,
    deps: Vec<TransDep>,

    // unit id -> sibling list
    units: HashMap<String, Vec<JobIdx>>,
    unit_order: Vec<String>,

    anchor: Option<JobIdx>,
    anchor_installed: Option<Rc<Job>>,
    irreversible: bool,
    generation: u32,
}

impl JobTransaction {
    pub fn new(irreversible: bool) -> JobTransaction {
        JobTransaction {
            jobs: Vec::new(),
            deps: Vec::new(),
            units: HashMap::new(),
            unit_order: Vec::new(),
            anchor: None,
            anchor_installed: None,
            irreversible,
            generation: 0,
        }
    }

    ///
    pub fn is_empty(&self) -> bool {
        self.n_jobs() == 0
    }

    /// prospective jobs still alive
    pub fn n_jobs(&self) -> usize {
        self.jobs.iter().filter(|j| j.alive).count()
    }

    /// the installed job the anchor request ended up as; set by a successful
    /// activation
    pub fn anchor_job(&self) -> Option<Rc<Job>> {
        self.anchor_installed.clone()
    }

    /// drop every prospective job and edge; the live table is not touched
    pub fn abort(&mut self) {
        log::debug!("aborting transaction with {} jobs", self.n_jobs());
        self.clear();
    }

    /// Add a job for `config` and recursively everything it pulls in.
    ///
    /// With `by` unset the new job becomes the transaction's anchor; there is
    /// exactly one anchor per transaction. `matters` and `conflicts` describe
    /// the edge from `by`. `ignore_requirements` suppresses the recursion,
    /// `ignore_order` exempts the job from ordering.
    pub fn add_job_and_dependencies(
        &mut self,
        db: &UnitDb,
        config: &JobConf,
        by: Option<JobIdx>,
        matters: bool,
        conflicts: bool,
        ignore_requirements: bool,
        ignore_order: bool,
    ) -> Result<JobIdx, JobErrno> {
        let unit = config.get_unit();

        // a reload may have left the view stale
        if db.is_reloading() {
            unit.coldplug();
        }

        let conf = JobConf::map(config);
        let kind = conf.get_kind();

        // stopping is permitted whatever the load state says
        if kind != JobKind::JobStop && !unit.is_load_complete() && !unit.try_load() {
            return Err(JobErrno::JobErrNotLoaded);
        }

        if !job_entry::job_is_unit_applicable(kind, unit) {
            return Err(JobErrno::JobErrNotApplicable);
        }

        let (ret, is_new) = self.add_one_job(kind, unit);
        if ignore_order {
            self.job_mut(ret).ignore_order = true;
        }

        match by {
            Some(subject) => {
                self.new_dep(subject, ret, matters, conflicts);
            }
            None => {
                assert!(
                    self.anchor.is_none(),
                    "a transaction carries exactly one anchor"
                );
                self.anchor = Some(ret);
            }
        }

        if is_new && !ignore_requirements && kind != JobKind::JobNop {
            // followers mirror the request, opportunistically
            for other in unit.followers() {
                let fconf = JobConf::new(&other, kind);
                if let Err(err) = self.add_job_and_dependencies(
                    db,
                    &fconf,
                    Some(ret),
                    false,
                    false,
                    ignore_requirements,
                    ignore_order,
                ) {
                    log::warn!(
                        "skipping follower {} of {}: {}",
                        other.id(),
                        unit.id(),
                        err
                    );
                }
            }

            if matches!(kind, JobKind::JobStart | JobKind::JobRestart) {
                self.trans_expand_start(db, ret, unit, ignore_requirements, ignore_order)?;
            }
            if matches!(kind, JobKind::JobStop | JobKind::JobRestart) {
                self.trans_expand_stop(db, ret, kind, unit, ignore_requirements, ignore_order)?;
            }
            if kind == JobKind::JobReload {
                self.trans_expand_reload(db, ret, unit, ignore_requirements, ignore_order)?;
            }
        }

        Ok(ret)
    }

    /// add collapsed try-reloads for everything `unit` propagates reload to
    pub fn add_propagate_reload_jobs(
        &mut self,
        db: &UnitDb,
        unit: &Rc<UnitX>,
        by: JobIdx,
        ignore_order: bool,
    ) -> Result<(), JobErrno> {
        self.trans_expand_reload(db, by, unit, false, ignore_order)
    }

    /// Queue a stop for every unit that is not meant to survive an isolate.
    ///
    /// Exempt are units that are not loaded, already down, flagged
    /// ignore-on-isolate, already part of this transaction, or triggered by
    /// an exempted unit. Per-unit failures are logged, never fatal.
    pub fn add_isolate_jobs(&mut self, db: &UnitDb) -> Result<(), JobErrno> {
        let anchor = self.anchor.expect("isolate jobs follow an anchor request");

        for other in db.units_get_all() {
            if !other.is_load_complete() {
                continue;
            }
            if other.ignore_on_isolate() {
                continue;
            }
            if other.current_active_state().is_inactive_or_failed() {
                continue;
            }
            if self.units.contains_key(other.id()) {
                continue;
            }
            // a kept unit keeps whatever it triggers
            if db
                .dep_gets_atom(&other, UnitRelationAtom::UnitAtomTriggeredBy)
                .iter()
                .any(|t| t.ignore_on_isolate())
            {
                continue;
            }

            let conf = JobConf::new(&other, JobKind::JobStop);
            if let Err(err) =
                self.add_job_and_dependencies(db, &conf, Some(anchor), true, false, false, false)
            {
                log::warn!("cannot stop {} while isolating: {}", other.id(), err);
            }
        }

        Ok(())
    }

    /// queue a stop for every active unit that `unit` triggers
    pub fn add_triggering_jobs(&mut self, db: &UnitDb, unit: &Rc<UnitX>) -> Result<(), JobErrno> {
        let anchor = self.anchor.expect("triggered stops follow an anchor request");

        for other in db.dep_gets_atom(unit, UnitRelationAtom::UnitAtomTriggers) {
            if !other.current_active_state().is_active_or_activating() {
                continue;
            }
            if self.units.contains_key(other.id()) {
                continue;
            }

            let conf = JobConf::new(&other, JobKind::JobStop);
            if let Err(err) =
                self.add_job_and_dependencies(db, &conf, Some(anchor), true, false, false, false)
            {
                log::warn!("cannot stop triggered unit {}: {}", other.id(), err);
            }
        }

        Ok(())
    }

    /// Reduce the prospective graph and commit the survivors into `table`.
    ///
    /// On a fatal error the transaction is left intact and safe to `abort`;
    /// on success its job map is empty.
    pub fn activate(
        &mut self,
        db: &UnitDb,
        table: &JobTable,
        ja: &JobAlloc,
        mode: JobMode,
        notifier: &dyn JobNotifier,
        affect: Option<&mut JobAffect>,
    ) -> Result<(), JobErrno> {
        if mode == JobMode::JobReplaceIrreversibly {
            self.irreversible = true;
            for j in self.live_jobs() {
                self.job_mut(j).irreversible = true;
            }
        }

        self.mark_matters_to_anchor();

        if mode == JobMode::JobFail {
            self.minimize_impact(table);
        }

        self.drop_redundant(table);

        loop {
            loop {
                if !mode.is_gc_skipped() {
                    self.collect_garbage();
                }
                match self.verify_order(db, table)? {
                    OrdWalk::Again => continue,
                    OrdWalk::Clean => break,
                }
            }
            if !self.merge_jobs()? {
                break;
            }
        }

        self.drop_redundant(table);

        self.check_destructive(table, mode)?;

        self.apply(table, ja, mode, notifier, affect)
    }

    // ---- graph primitives ----------------------------------------------

    fn job(&self, j: JobIdx) -> &TransJob {
        &self.jobs[j.0 as usize]
    }

    fn job_mut(&mut self, j: JobIdx) -> &mut TransJob {
        &mut self.jobs[j.0 as usize]
    }

    fn dep(&self, e: DepIdx) -> &TransDep {
        &self.deps[e.0 as usize]
    }

    fn live_jobs(&self) -> Vec<JobIdx> {
        (0..self.jobs.len() as u32)
            .map(JobIdx)
            .filter(|&j| self.job(j).alive)
            .collect()
    }

    /// find a sibling of the same kind, or allocate a fresh node
    fn add_one_job(&mut self, kind: JobKind, unit: &Rc<UnitX>) -> (JobIdx, bool) {
        if let Some(sibs) = self.units.get(unit.id()) {
            for &s in sibs.iter() {
                if self.job(s).kind == kind {
                    return (s, false);
                }
            }
        }

        let idx = JobIdx(self.jobs.len() as u32);
        self.jobs.push(TransJob {
            unit: Rc::clone(unit),
            kind,
            irreversible: self.irreversible,
            ignore_order: false,
            matters_to_anchor: false,
            generation: 0,
            walk: WalkState::Unvisited,
            pred: None,
            subjects: Vec::new(),
            objects: Vec::new(),
            alive: true,
        });

        if !self.units.contains_key(unit.id()) {
            self.unit_order.push(unit.id().clone());
        }
        self.units
            .entry(unit.id().clone())
            .or_insert_with(Vec::new)
            .push(idx);
        (idx, true)
    }

    fn new_dep(&mut self, subject: JobIdx, object: JobIdx, matters: bool, conflicts: bool) {
        // a job needs no edge to itself
        if subject == object {
            return;
        }
        let e = DepIdx(self.deps.len() as u32);
        self.deps.push(TransDep {
            subject,
            object,
            matters,
            conflicts,
        });
        self.job_mut(subject).subjects.push(e);
        self.job_mut(object).objects.push(e);
    }

    /// Remove `j` from the transaction and free its edges. With
    /// `delete_dependencies`, jobs whose success required `j` (subjects of a
    /// matters-edge onto it) are deleted recursively; orphaned objects are
    /// left for the garbage collector.
    fn unlink_job(&mut self, j: JobIdx, delete_dependencies: bool) {
        if !self.job(j).alive {
            return;
        }
        self.job_mut(j).alive = false;

        let unit_id = self.job(j).unit.id().clone();
        if let Some(sibs) = self.units.get_mut(&unit_id) {
            sibs.retain(|&s| s != j);
            if sibs.is_empty() {
                self.units.remove(&unit_id);
                self.unit_order.retain(|u| u != &unit_id);
            }
        }

        let subjects = std::mem::take(&mut self.job_mut(j).subjects);
        for e in subjects {
            let object = self.dep(e).object;
            self.job_mut(object).objects.retain(|&x| x != e);
        }

        let objects = std::mem::take(&mut self.job_mut(j).objects);
        let mut broken: Vec<JobIdx> = Vec::new();
        for e in objects {
            let subject = self.dep(e).subject;
            let matters = self.dep(e).matters;
            self.job_mut(subject).subjects.retain(|&x| x != e);
            if matters {
                broken.push(subject);
            }
        }

        if delete_dependencies {
            for s in broken {
                if self.job(s).alive {
                    log::debug!(
                        "deleting job {}/{}, its requirement went away",
                        self.job(s).unit.id(),
                        self.job(s).kind
                    );
                    self.unlink_job(s, true);
                }
            }
        }
    }

    /// delete every prospective job of one unit
    fn delete_unit(&mut self, unit_id: &str) {
        if let Some(sibs) = self.units.get(unit_id).cloned() {
            for s in sibs {
                self.unlink_job(s, true);
            }
        }
    }

    /// Fold `other` into `j`, which becomes kind `t`. Edges of `other` are
    /// re-parented onto `j`; edges between the pair die. The anchor survives
    /// a merge by reference update.
    fn merge_and_delete(&mut self, j: JobIdx, other: JobIdx, t: JobKind) {
        self.job_mut(j).kind = t;
        let other_irreversible = self.job(other).irreversible;
        let other_matters = self.job(other).matters_to_anchor;
        let other_ignore_order = self.job(other).ignore_order;
        self.job_mut(j).irreversible |= other_irreversible;
        self.job_mut(j).matters_to_anchor |= other_matters;
        self.job_mut(j).ignore_order |= other_ignore_order;

        let subjects = std::mem::take(&mut self.job_mut(other).subjects);
        for e in subjects {
            if self.dep(e).object == j {
                self.job_mut(j).objects.retain(|&x| x != e);
                continue;
            }
            self.deps[e.0 as usize].subject = j;
            self.job_mut(j).subjects.push(e);
        }

        let objects = std::mem::take(&mut self.job_mut(other).objects);
        for e in objects {
            if self.dep(e).subject == j {
                self.job_mut(j).subjects.retain(|&x| x != e);
                continue;
            }
            self.deps[e.0 as usize].object = j;
            self.job_mut(j).objects.push(e);
        }

        let unit_id = self.job(other).unit.id().clone();
        if let Some(sibs) = self.units.get_mut(&unit_id) {
            sibs.retain(|&s| s != other);
        }
        self.job_mut(other).alive = false;

        if self.anchor == Some(other) {
            self.anchor = Some(j);
        }
    }

    fn clear(&mut self) {
        self.jobs.clear();
        self.deps.clear();
        self.units.clear();
        self.unit_order.clear();
        self.anchor = None;
    }

    // ---- construction helpers ------------------------------------------

    fn trans_expand_start(
        &mut self,
        db: &UnitDb,
        by: JobIdx,
        unit: &Rc<UnitX>,
        ignore_requirements: bool,
        ignore_order: bool,
    ) -> Result<(), JobErrno> {
        for other in db
            .dep_gets_atom(unit, UnitRelationAtom::UnitAtomPullInStart)
            .iter()
        {
            let conf = JobConf::new(other, JobKind::JobStart);
            self.add_job_and_dependencies(
                db,
                &conf,
                Some(by),
                true,
                false,
                ignore_requirements,
                ignore_order,
            )?;
        }
        for other in db
            .dep_gets_atom(unit, UnitRelationAtom::UnitAtomPullInStartIgnored)
            .iter()
        {
            let conf = JobConf::new(other, JobKind::JobStart);
            if let Err(err) = self.add_job_and_dependencies(
                db,
                &conf,
                Some(by),
                false,
                false,
                ignore_requirements,
                ignore_order,
            ) {
                log::warn!("skipping wanted unit {}: {}", other.id(), err);
            }
        }
        for other in db
            .dep_gets_atom(unit, UnitRelationAtom::UnitAtomPullInVerify)
            .iter()
        {
            let conf = JobConf::new(other, JobKind::JobVerify);
            self.add_job_and_dependencies(
                db,
                &conf,
                Some(by),
                true,
                false,
                ignore_requirements,
                ignore_order,
            )?;
        }
        for other in db
            .dep_gets_atom(unit, UnitRelationAtom::UnitAtomPullInStop)
            .iter()
        {
            let conf = JobConf::new(other, JobKind::JobStop);
            self.add_job_and_dependencies(
                db,
                &conf,
                Some(by),
                true,
                true,
                ignore_requirements,
                ignore_order,
            )?;
        }
        for other in db
            .dep_gets_atom(unit, UnitRelationAtom::UnitAtomPullInStopIgnored)
            .iter()
        {
            let conf = JobConf::new(other, JobKind::JobStop);
            if let Err(err) = self.add_job_and_dependencies(
                db,
                &conf,
                Some(by),
                false,
                false,
                ignore_requirements,
                ignore_order,
            ) {
                log::warn!("skipping conflicted-by stop of {}: {}", other.id(), err);
            }
        }

        Ok(())
    }

    fn trans_expand_stop(
        &mut self,
        db: &UnitDb,
        by: JobIdx,
        kind: JobKind,
        unit: &Rc<UnitX>,
        ignore_requirements: bool,
        ignore_order: bool,
    ) -> Result<(), JobErrno> {
        let (expand_atom, expand_kind) = match kind {
            JobKind::JobStop => (UnitRelationAtom::UnitAtomPropagateStop, JobKind::JobStop),
            JobKind::JobRestart => (
                UnitRelationAtom::UnitAtomPropagateRestart,
                JobKind::JobTryRestart,
            ),
            _ => unreachable!("invalid configuration."),
        };

        for other in db.dep_gets_atom(unit, expand_atom).iter() {
            // the try-kind decays against the target; idle units need nothing
            let conf = JobConf::map(&JobConf::new(other, expand_kind));
            if conf.get_kind() == JobKind::JobNop {
                continue;
            }
            self.add_job_and_dependencies(
                db,
                &conf,
                Some(by),
                true,
                false,
                ignore_requirements,
                ignore_order,
            )?;
        }

        Ok(())
    }

    fn trans_expand_reload(
        &mut self,
        db: &UnitDb,
        by: JobIdx,
        unit: &Rc<UnitX>,
        ignore_requirements: bool,
        ignore_order: bool,
    ) -> Result<(), JobErrno> {
        for other in db
            .dep_gets_atom(unit, UnitRelationAtom::UnitAtomPropagatesReloadTo)
            .iter()
        {
            let conf = JobConf::map(&JobConf::new(other, JobKind::JobTryReload));
            if conf.get_kind() == JobKind::JobNop {
                continue;
            }
            self.add_job_and_dependencies(
                db,
                &conf,
                Some(by),
                true,
                false,
                ignore_requirements,
                ignore_order,
            )?;
        }

        Ok(())
    }

    // ---- reduction passes ----------------------------------------------

    /// depth-first sweep from the anchor along matters-edges
    fn mark_matters_to_anchor(&mut self) {
        let anchor = match self.anchor {
            Some(a) => a,
            None => return,
        };

        let mut stack = vec![anchor];
        while let Some(j) = stack.pop() {
            if self.job(j).matters_to_anchor {
                continue;
            }
            self.job_mut(j).matters_to_anchor = true;
            for i in 0..self.job(j).subjects.len() {
                let e = self.job(j).subjects[i];
                if self.dep(e).matters {
                    stack.push(self.dep(e).object);
                }
            }
        }
    }

    /// drop jobs nobody asked for that would stop running services or upset
    /// installed jobs
    fn minimize_impact(&mut self, table: &JobTable) {
        loop {
            let mut victim = None;
            for j in self.live_jobs() {
                if self.job(j).matters_to_anchor {
                    continue;
                }

                let unit = &self.job(j).unit;
                let stops_running = self.job(j).kind == JobKind::JobStop
                    && unit.current_active_state().is_active_or_activating();
                let changes_installed = table
                    .get(unit)
                    .map_or(false, |uj| job_entry::job_is_conflicting(self.job(j).kind, uj.kind()));

                if stops_running || changes_installed {
                    victim = Some(j);
                    break;
                }
            }

            match victim {
                Some(j) => {
                    log::debug!(
                        "minimizing impact, deleting job {}/{}",
                        self.job(j).unit.id(),
                        self.job(j).kind
                    );
                    self.unlink_job(j, true);
                }
                None => break,
            }
        }
    }

    /// drop every unit whose siblings are all no-ops against its state
    fn drop_redundant(&mut self, table: &JobTable) {
        loop {
            let mut dropped = false;
            for unit_id in self.unit_order.clone() {
                let sibs = match self.units.get(&unit_id) {
                    Some(s) => s.clone(),
                    None => continue,
                };

                let keep = sibs.iter().any(|&k| {
                    if self.anchor == Some(k) {
                        return true;
                    }
                    let unit = &self.job(k).unit;
                    if !job_entry::job_is_redundant(self.job(k).kind, unit.current_active_state()) {
                        return true;
                    }
                    table
                        .get(unit)
                        .map_or(false, |uj| job_entry::job_is_conflicting(self.job(k).kind, uj.kind()))
                });

                if !keep {
                    log::debug!("deleting redundant jobs for unit {}", unit_id);
                    for k in sibs {
                        self.unlink_job(k, false);
                    }
                    dropped = true;
                    break;
                }
            }
            if !dropped {
                break;
            }
        }
    }

    /// delete non-anchor jobs that nothing pulls in any more
    fn collect_garbage(&mut self) {
        loop {
            let mut victim = None;
            for j in self.live_jobs() {
                if self.anchor == Some(j) {
                    continue;
                }
                if self.job(j).objects.is_empty() {
                    victim = Some(j);
                    break;
                }
            }

            match victim {
                Some(j) => {
                    log::debug!(
                        "garbage collecting job {}/{}",
                        self.job(j).unit.id(),
                        self.job(j).kind
                    );
                    self.unlink_job(j, true);
                }
                None => break,
            }
        }
    }

    // ---- ordering verification -----------------------------------------

    /// Check the job-execution ordering graph for cycles.
    ///
    /// Returns `Again` after breaking a cycle by deleting a deletable member,
    /// `Clean` if acyclic, `JobErrOrderCyclic` if a cycle has no deletable
    /// member.
    fn verify_order(&mut self, db: &UnitDb, table: &JobTable) -> Result<OrdWalk, JobErrno> {
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let mut installed: HashMap<u32, (WalkState, Option<OrdNode>)> = HashMap::new();

        for j in self.live_jobs() {
            if !self.job(j).alive {
                continue;
            }
            if let OrdWalk::Again = self.verify_order_one(
                db,
                table,
                OrdNode::Trans(j),
                None,
                generation,
                &mut installed,
            )? {
                return Ok(OrdWalk::Again);
            }
        }

        Ok(OrdWalk::Clean)
    }

    fn verify_order_one(
        &mut self,
        db: &UnitDb,
        table: &JobTable,
        node: OrdNode,
        from: Option<OrdNode>,
        generation: u32,
        installed: &mut HashMap<u32, (WalkState, Option<OrdNode>)>,
    ) -> Result<OrdWalk, JobErrno> {
        let walk = match node {
            OrdNode::Trans(j) => {
                if !self.job(j).alive {
                    return Ok(OrdWalk::Clean);
                }
                if self.job(j).generation == generation {
                    self.job(j).walk
                } else {
                    WalkState::Unvisited
                }
            }
            OrdNode::Installed(id) => installed
                .get(&id)
                .map(|(walk, _)| *walk)
                .unwrap_or(WalkState::Unvisited),
        };

        match walk {
            WalkState::OnPath => return self.try_break_cycle(node, from, generation, installed),
            WalkState::Done => return Ok(OrdWalk::Clean),
            WalkState::Unvisited => {}
        }

        self.set_walk(node, generation, WalkState::OnPath, from, installed);

        let (unit, kind, ignore_order) = match node {
            OrdNode::Trans(j) => (
                Rc::clone(&self.job(j).unit),
                self.job(j).kind,
                self.job(j).ignore_order,
            ),
            OrdNode::Installed(id) => match table.get_by_id(id) {
                Some(job) => (Rc::clone(job.unit()), job.kind(), job.ignore_order()),
                None => return Ok(OrdWalk::Clean),
            },
        };

        if !ignore_order {
            for atom in [
                UnitRelationAtom::UnitAtomAfter,
                UnitRelationAtom::UnitAtomBefore,
            ] {
                for u in db.dep_gets_atom(&unit, atom) {
                    // prospective jobs shadow the installed one on their unit
                    let candidates: Vec<(OrdNode, JobKind)> = match self.units.get(u.id()) {
                        Some(sibs) => sibs
                            .iter()
                            .map(|&s| (OrdNode::Trans(s), self.job(s).kind))
                            .collect(),
                        None => match table.get(&u) {
                            Some(uj) => vec![(OrdNode::Installed(uj.id()), uj.kind())],
                            None => Vec::new(),
                        },
                    };

                    for (onode, okind) in candidates {
                        if onode == node {
                            continue;
                        }
                        // follow only edges where `node` truly runs first
                        if job_entry::job_order_compare(kind, okind, atom) >= 0 {
                            continue;
                        }
                        if let OrdWalk::Again = self.verify_order_one(
                            db,
                            table,
                            onode,
                            Some(node),
                            generation,
                            installed,
                        )? {
                            return Ok(OrdWalk::Again);
                        }
                    }
                }
            }
        }

        self.set_walk(node, generation, WalkState::Done, None, installed);
        Ok(OrdWalk::Clean)
    }

    fn set_walk(
        &mut self,
        node: OrdNode,
        generation: u32,
        walk: WalkState,
        pred: Option<OrdNode>,
        installed: &mut HashMap<u32, (WalkState, Option<OrdNode>)>,
    ) {
        match node {
            OrdNode::Trans(j) => {
                let job = self.job_mut(j);
                job.generation = generation;
                job.walk = walk;
                job.pred = pred;
            }
            OrdNode::Installed(id) => {
                installed.insert(id, (walk, pred));
            }
        }
    }

    fn pred_of(
        &self,
        node: OrdNode,
        installed: &HashMap<u32, (WalkState, Option<OrdNode>)>,
    ) -> Option<OrdNode> {
        match node {
            OrdNode::Trans(j) => self.job(j).pred,
            OrdNode::Installed(id) => installed.get(&id).and_then(|(_, pred)| *pred),
        }
    }

    /// `node` was reached again while on the path: walk the predecessors back
    /// to it, pick a deletable member, delete that member's unit
    fn try_break_cycle(
        &mut self,
        node: OrdNode,
        from: Option<OrdNode>,
        _generation: u32,
        installed: &HashMap<u32, (WalkState, Option<OrdNode>)>,
    ) -> Result<OrdWalk, JobErrno> {
        let mut members: Vec<OrdNode> = vec![node];
        let mut walker = from;
        while let Some(m) = walker {
            if m == node {
                break;
            }
            members.push(m);
            walker = self.pred_of(m, installed);
        }

        let describe: Vec<String> = members
            .iter()
            .map(|m| match m {
                OrdNode::Trans(j) => format!("{}/{}", self.job(*j).unit.id(), self.job(*j).kind),
                OrdNode::Installed(id) => format!("installed#{}", id),
            })
            .collect();
        log::warn!("found ordering cycle: {}", describe.join(" -> "));

        for m in members.iter() {
            if let OrdNode::Trans(j) = m {
                if self.anchor == Some(*j) || self.job(*j).matters_to_anchor {
                    continue;
                }
                let unit_id = self.job(*j).unit.id().clone();
                log::warn!(
                    "breaking the cycle by deleting the jobs of {}",
                    unit_id
                );
                self.delete_unit(&unit_id);
                return Ok(OrdWalk::Again);
            }
        }

        Err(JobErrno::JobErrOrderCyclic)
    }

    // ---- merging --------------------------------------------------------

    /// Collapse every sibling list to a single job.
    ///
    /// Returns `Ok(true)` after deleting one side of an unmergeable pair (the
    /// caller re-enters the reduction loop), `Ok(false)` when every unit is
    /// down to one job.
    fn merge_jobs(&mut self) -> Result<bool, JobErrno> {
        // phase A: find units whose siblings cannot fold into one kind
        for unit_id in self.unit_order.clone() {
            let sibs = match self.units.get(&unit_id) {
                Some(s) if s.len() > 1 => s.clone(),
                _ => continue,
            };

            if self.fold_siblings(&sibs).is_none() {
                if self.delete_one_unmergeable(&sibs)? {
                    return Ok(true);
                }
                return Err(JobErrno::JobErrConflicting);
            }
        }

        // phase B: fold, preserving the anchor as the survivor
        for unit_id in self.unit_order.clone() {
            let sibs = match self.units.get(&unit_id) {
                Some(s) if s.len() > 1 => s.clone(),
                _ => continue,
            };

            let folded = self
                .fold_siblings(&sibs)
                .expect("phase A left the siblings mergeable");

            let mut survivor = sibs[0];
            if let Some(anchor) = self.anchor {
                if sibs.contains(&anchor) {
                    survivor = anchor;
                }
            }

            for other in sibs {
                if other == survivor {
                    continue;
                }
                self.merge_and_delete(survivor, other, folded);
            }
        }

        Ok(false)
    }

    fn fold_siblings(&self, sibs: &[JobIdx]) -> Option<JobKind> {
        let unit = Rc::clone(&self.job(sibs[0]).unit);
        let mut folded = self.job(sibs[0]).kind;
        for &k in &sibs[1..] {
            folded = job_entry::job_merge_and_collapse(folded, self.job(k).kind, &unit)?;
        }
        Some(folded)
    }

    /// was this job pulled in over a conflicts-edge?
    fn pulled_in_by_conflicts(&self, j: JobIdx) -> bool {
        self.job(j).objects.iter().any(|&e| self.dep(e).conflicts)
    }

    /// Decide which side of the first unmergeable sibling pair to drop.
    ///
    /// Jobs that matter to the anchor are untouchable; among the others stops
    /// lose against starts, unless the stop exists because something else
    /// conflicts with the unit.
    fn delete_one_unmergeable(&mut self, sibs: &[JobIdx]) -> Result<bool, JobErrno> {
        for (i, &a) in sibs.iter().enumerate() {
            for &b in &sibs[i + 1..] {
                let (ka, kb) = (self.job(a).kind, self.job(b).kind);
                if job_entry::job_is_mergeable(ka, kb) {
                    continue;
                }

                let (ma, mb) = (self.job(a).matters_to_anchor, self.job(b).matters_to_anchor);
                let d = if !ma && !mb {
                    let ca = self.pulled_in_by_conflicts(a);
                    let cb = self.pulled_in_by_conflicts(b);
                    if ka == JobKind::JobStop && kb == JobKind::JobStop {
                        if ca && !cb {
                            b
                        } else if cb && !ca {
                            a
                        } else {
                            a
                        }
                    } else if ka == JobKind::JobStop {
                        if ca {
                            b
                        } else {
                            a
                        }
                    } else if kb == JobKind::JobStop {
                        if cb {
                            a
                        } else {
                            b
                        }
                    } else if ka == JobKind::JobNop {
                        a
                    } else if kb == JobKind::JobNop {
                        b
                    } else {
                        a
                    }
                } else if !ma {
                    a
                } else if !mb {
                    b
                } else {
                    return Err(JobErrno::JobErrConflicting);
                };

                log::debug!(
                    "fixing conflicting jobs by deleting job {}/{}",
                    self.job(d).unit.id(),
                    self.job(d).kind
                );
                self.unlink_job(d, true);
                return Ok(true);
            }
        }

        Ok(false)
    }

    // ---- gate and apply -------------------------------------------------

    /// refuse to cancel installed jobs the mode or their flags protect
    fn check_destructive(&self, table: &JobTable, mode: JobMode) -> Result<(), JobErrno> {
        for j in self.live_jobs() {
            if let Some(uj) = table.get(&self.job(j).unit) {
                if (mode == JobMode::JobFail || uj.irreversible())
                    && job_entry::job_is_conflicting(uj.kind(), self.job(j).kind)
                {
                    return Err(JobErrno::JobErrDestructive);
                }
            }
        }
        Ok(())
    }

    /// move the surviving jobs into the live table, one critical section
    fn apply(
        &mut self,
        table: &JobTable,
        ja: &JobAlloc,
        mode: JobMode,
        notifier: &dyn JobNotifier,
        mut affect: Option<&mut JobAffect>,
    ) -> Result<(), JobErrno> {
        // isolating or flushing cancels everything not re-requested
        if mode.is_pre_cancel() {
            for uj in table.jobs() {
                if self.units.contains_key(uj.unit().id()) {
                    continue;
                }
                if uj.unit().ignore_on_isolate() {
                    continue;
                }
                log::debug!("canceling installed job {:?} for {:?}", uj, mode);
                table.finish_job(&uj, JobState::JobCanceled, notifier);
            }
        }

        // publish ids first; all-or-nothing
        let mut pending: Vec<(JobIdx, Rc<Job>)> = Vec::new();
        let mut failed = None;
        'publish: for unit_id in self.unit_order.clone() {
            let sibs = match self.units.get(&unit_id) {
                Some(s) => s.clone(),
                None => continue,
            };
            for j in sibs {
                let node = self.job(j);
                let job = Job::new(&node.unit, node.kind);
                job.set_id(ja.alloc());
                job.set_irreversible(node.irreversible);
                job.set_ignore_order(node.ignore_order);
                if let Err(err) = table.publish(&job) {
                    failed = Some(err);
                    break 'publish;
                }
                pending.push((j, job));
            }
        }
        if let Some(err) = failed {
            for (_, job) in pending {
                table.remove_id(job.id());
            }
            return Err(err);
        }

        // install, merging into whatever is already there
        let anchor = self.anchor;
        for (j, job) in pending {
            self.unlink_job(j, false);

            let installed = table.install(&job, notifier);
            if !Rc::ptr_eq(&installed, &job) {
                table.remove_id(job.id());
            }
            if anchor == Some(j) {
                self.anchor_installed = Some(Rc::clone(&installed));
            }

            notifier.enqueue_run(&installed);
            notifier.notify(&installed);
            notifier.start_timer(&installed);
            notifier.shutdown_magic(&installed);

            if let Some(aff) = affect.as_deref_mut() {
                aff.record(&installed);
            }
        }

        self.clear();
        Ok(())
    }
}
