use std::cell::RefCell;
use std::rc::Rc;

use bevy_gpu_trail::gpu::resource_cache::{LodBufferCache, ReleaseBuffers};
use bevy_gpu_trail::lod::LodGeometry;

type Log = Rc<RefCell<Vec<String>>>;

struct FakeBuffers {
    name: String,
    log: Log,
}

impl ReleaseBuffers for FakeBuffers {
    fn release(&mut self) {
        self.log.borrow_mut().push(format!("release {}", self.name));
    }
}

fn create(log: &Log) -> impl FnOnce(&LodGeometry) -> FakeBuffers {
    move |geometry: &LodGeometry| {
        let name = format!("{}x{}", geometry.trail_num, geometry.node_num_per_trail_with_lod());
        log.borrow_mut().push(format!("create {name}"));
        FakeBuffers {
            name,
            log: log.clone(),
        }
    }
}

#[test]
fn first_ensure_allocates() {
    let log = Log::default();
    let mut cache = LodBufferCache::default();
    let geometry = LodGeometry::new(10, 64, 1).unwrap();

    let (buffers, reallocated) = cache.ensure(&geometry, create(&log));
    assert!(reallocated);
    assert_eq!(buffers.name, "10x64");
    assert_eq!(*log.borrow(), vec!["create 10x64"]);
}

#[test]
fn same_geometry_reuses_buffers() {
    let log = Log::default();
    let mut cache = LodBufferCache::default();
    let geometry = LodGeometry::new(10, 64, 1).unwrap();

    cache.ensure(&geometry, create(&log));
    let (_, reallocated) = cache.ensure(&geometry, create(&log));
    assert!(!reallocated);
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn changed_geometry_releases_before_creating() {
    let log = Log::default();
    let mut cache = LodBufferCache::default();

    cache.ensure(&LodGeometry::new(10, 64, 1).unwrap(), create(&log));
    let (buffers, reallocated) = cache.ensure(&LodGeometry::new(20, 64, 1).unwrap(), create(&log));
    assert!(reallocated);
    assert_eq!(buffers.name, "20x64");
    assert_eq!(
        *log.borrow(),
        vec!["create 10x64", "release 10x64", "create 20x64"]
    );
}

#[test]
fn step_change_with_same_node_count_keeps_buffers() {
    let log = Log::default();
    let mut cache = LodBufferCache::default();

    cache.ensure(&LodGeometry::new(4, 64, 7).unwrap(), create(&log)); // 9 nodes
    let (_, reallocated) = cache.ensure(&LodGeometry::new(4, 63, 7).unwrap(), create(&log)); // 9 nodes
    assert!(!reallocated);
}

#[test]
fn release_empties_the_cache_once() {
    let log = Log::default();
    let mut cache = LodBufferCache::default();

    cache.ensure(&LodGeometry::new(1, 8, 2).unwrap(), create(&log));
    cache.release();
    cache.release();
    assert!(cache.get().is_none());
    assert_eq!(*log.borrow(), vec!["create 1x4", "release 1x4"]);
}
