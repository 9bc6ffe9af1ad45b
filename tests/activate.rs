//! end-to-end planning scenarios over the public surface

use jobtrans::{
    JobAffect, JobConf, JobErrno, JobKind, JobManager, JobMode, JobNotifier, JobState,
    NopNotifier, UnitActiveState, UnitDb, UnitRelations, UnitType, UnitX,
};
use std::rc::Rc;

fn create_unit(db: &UnitDb, unit_type: UnitType, name: &str) -> Rc<UnitX> {
    let unit = UnitX::new(unit_type, name);
    db.units_insert(Rc::clone(&unit));
    unit
}

fn manager_init() -> (Rc<UnitDb>, JobManager) {
    let db = Rc::new(UnitDb::new());
    let jm = JobManager::new(&db, Rc::new(NopNotifier) as Rc<dyn JobNotifier>);
    (db, jm)
}

#[test]
fn starting_a_target_brings_up_the_tree() {
    let (db, jm) = manager_init();
    let target = create_unit(&db, UnitType::UnitTarget, "multi-user.target");
    let web = create_unit(&db, UnitType::UnitService, "web.service");
    let dbus = create_unit(&db, UnitType::UnitService, "db.service");
    let log = create_unit(&db, UnitType::UnitService, "log.service");

    db.dep_insert(&target, UnitRelations::UnitRequires, &web);
    db.dep_insert(&web, UnitRelations::UnitRequires, &dbus);
    db.dep_insert(&web, UnitRelations::UnitWants, &log);
    db.dep_insert(&dbus, UnitRelations::UnitBefore, &web);

    let mut affect = JobAffect::new();
    jm.exec(
        &JobConf::new(&target, JobKind::JobStart),
        JobMode::JobReplace,
        &mut affect,
    )
    .expect("a consistent tree starts");

    assert_eq!(jm.n_jobs(), 4);
    for unit in [&target, &web, &dbus, &log] {
        assert_eq!(jm.get_job(unit).unwrap().kind(), JobKind::JobStart);
    }

    // every touched job reported, each exactly once
    let mut names: Vec<String> = affect
        .adds
        .iter()
        .map(|job| job.unit().id().clone())
        .collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 4);

    // ids are unique and in publish order
    let mut ids: Vec<u32> = affect.adds.iter().map(|job| job.id()).collect();
    let sorted = ids.clone();
    ids.dedup();
    assert_eq!(ids, sorted);
}

#[test]
fn conflicting_services_swap_roles() {
    let (db, jm) = manager_init();
    let blue = create_unit(&db, UnitType::UnitService, "blue.service");
    let green = create_unit(&db, UnitType::UnitService, "green.service");
    blue.set_active_state(UnitActiveState::UnitActive);
    db.dep_insert(&green, UnitRelations::UnitConflicts, &blue);

    let mut affect = JobAffect::new();
    jm.exec(
        &JobConf::new(&green, JobKind::JobStart),
        JobMode::JobReplace,
        &mut affect,
    )
    .expect("the conflict resolves to a stop");

    assert_eq!(jm.get_job(&green).unwrap().kind(), JobKind::JobStart);
    assert_eq!(jm.get_job(&blue).unwrap().kind(), JobKind::JobStop);
}

#[test]
fn unbreakable_ordering_cycle_is_reported() {
    let (db, jm) = manager_init();
    let a = create_unit(&db, UnitType::UnitService, "a.service");
    let b = create_unit(&db, UnitType::UnitService, "b.service");
    db.dep_insert(&a, UnitRelations::UnitRequires, &b);
    db.dep_insert(&a, UnitRelations::UnitBefore, &b);
    db.dep_insert(&b, UnitRelations::UnitBefore, &a);

    let mut affect = JobAffect::new();
    assert_eq!(
        jm.exec(
            &JobConf::new(&a, JobKind::JobStart),
            JobMode::JobReplace,
            &mut affect,
        ),
        Err(JobErrno::JobErrOrderCyclic)
    );
    assert_eq!(jm.n_jobs(), 0);
}

#[test]
fn isolate_keeps_only_the_requested_world() {
    let (db, jm) = manager_init();
    let rescue = create_unit(&db, UnitType::UnitTarget, "rescue.target");
    let shell = create_unit(&db, UnitType::UnitService, "shell.service");
    let web = create_unit(&db, UnitType::UnitService, "web.service");
    let journal = create_unit(&db, UnitType::UnitService, "journal.service");
    db.dep_insert(&rescue, UnitRelations::UnitRequires, &shell);
    web.set_active_state(UnitActiveState::UnitActive);
    journal.set_active_state(UnitActiveState::UnitActive);
    journal.set_ignore_on_isolate(true);

    let mut affect = JobAffect::new();
    jm.exec(
        &JobConf::new(&rescue, JobKind::JobStart),
        JobMode::JobIsolate,
        &mut affect,
    )
    .expect("isolation is well-formed");

    assert_eq!(jm.get_job(&rescue).unwrap().kind(), JobKind::JobStart);
    assert_eq!(jm.get_job(&shell).unwrap().kind(), JobKind::JobStart);
    assert_eq!(jm.get_job(&web).unwrap().kind(), JobKind::JobStop);
    assert!(jm.get_job(&journal).is_none());
}

#[test]
fn restart_request_decays_on_an_idle_unit() {
    let (db, jm) = manager_init();
    let a = create_unit(&db, UnitType::UnitService, "a.service");

    let mut affect = JobAffect::new();
    jm.exec(
        &JobConf::new(&a, JobKind::JobTryRestart),
        JobMode::JobReplace,
        &mut affect,
    )
    .expect("a nop request is fine");

    // the decayed nop is the anchor, so it installs, but does nothing more
    let job = jm.get_job(&a).expect("the anchor survives");
    assert_eq!(job.kind(), JobKind::JobNop);
    assert_eq!(job.state(), JobState::JobWaiting);
    assert_eq!(jm.n_jobs(), 1);
}

#[test]
fn executor_feedback_frees_the_unit_slot() {
    let (db, jm) = manager_init();
    let a = create_unit(&db, UnitType::UnitService, "a.service");

    let mut affect = JobAffect::new();
    jm.exec(
        &JobConf::new(&a, JobKind::JobStart),
        JobMode::JobReplace,
        &mut affect,
    )
    .expect("a plain start must succeed");

    let job = jm.get_job(&a).unwrap();
    jm.finish_job(&job, JobState::JobDone);
    a.set_active_state(UnitActiveState::UnitActive);

    // the unit can take new work immediately
    let mut affect = JobAffect::new();
    jm.exec(
        &JobConf::new(&a, JobKind::JobReload),
        JobMode::JobReplace,
        &mut affect,
    )
    .expect("a reload after a finished start");
    assert_eq!(jm.get_job(&a).unwrap().kind(), JobKind::JobReload);
}
