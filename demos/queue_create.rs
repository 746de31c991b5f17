use hsa_rs::kfd::device::KfdDevice;
use hsa_rs::kfd::sysfs::Topology;
use hsa_rs::thunk::async_handler::AsyncHandlerRegistry;
use hsa_rs::thunk::events::EventManager;
use hsa_rs::thunk::memory::MemoryManager;
use hsa_rs::thunk::queues::queue::{AqlQueue, AqlQueueConfig};
use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("============================================================");
    println!("             HSA Rust Thunk - Queue Creation Test           ");
    println!("============================================================");

    println!("[+] Opening /dev/kfd...");
    let device = Arc::new(KfdDevice::open()?);
    let version = device.get_version()?;
    println!(
        "    KFD Interface Version: {}.{}",
        version.major_version, version.minor_version
    );

    println!("[+] Scanning System Topology...");
    let topology = Topology::get_snapshot()?;
    let node_props: Vec<_> = topology.nodes.iter().map(|n| n.properties.clone()).collect();

    println!("[+] Initializing Memory Manager (FMM)...");
    let mem_mgr = MemoryManager::new(&device, &node_props)
        .map_err(|e| format!("Failed to initialize MemoryManager (Err: {e})"))?;

    let gpu_idx = topology
        .nodes
        .iter()
        .position(|n| n.properties.simd_count > 0)
        .ok_or("No GPU nodes found in topology")?;
    let gpu_node = &topology.nodes[gpu_idx];
    let gpu_id = gpu_node.properties.kfd_gpu_id;
    println!("[+] Selected Node {gpu_idx} (GPU ID: {gpu_id})");
    println!("    Name: {}", gpu_node.properties.marketing_name);

    let drm_minor = gpu_node.properties.drm_render_minor;
    if drm_minor < 0 {
        return Err("Invalid DRM render minor number".into());
    }
    let drm_path = format!("/dev/dri/renderD{drm_minor}");
    println!("[+] Opening DRM Device: {drm_path}");
    let drm_file = File::open(&drm_path).map_err(|e| format!("Failed to open {drm_path}: {e}"))?;
    let drm_fd = drm_file.as_raw_fd();

    println!("[+] Acquiring VM...");
    device.acquire_vm(gpu_id, drm_fd as u32)?;

    println!("[+] Spinning up event manager and async fault-handler thread...");
    let event_manager = Arc::new(EventManager::new(&node_props));
    let handlers = AsyncHandlerRegistry::spawn(device.clone(), event_manager.clone());

    println!("[+] Creating AQL compute queue (256 packets)...");
    let queue = AqlQueue::create(
        device.clone(),
        mem_mgr,
        event_manager,
        handlers,
        &gpu_node.properties,
        gpu_idx as u32,
        drm_fd,
        AqlQueueConfig {
            packet_count: 256,
            ..Default::default()
        },
        Some(Box::new(|kind, queue_id| {
            eprintln!("[queue {queue_id}] fault surfaced: {kind}");
        })),
    )
    .map_err(|e| format!("Queue creation failed (Err: {e})"))?;

    println!("============================================================");
    println!(" [SUCCESS] Queue Created!");
    println!("============================================================");
    println!("    Queue ID: {}", queue.queue_id());
    println!(
        "    Write idx: {}  Read idx: {}",
        queue.load_write_index_relaxed(),
        queue.load_read_index_relaxed()
    );

    // Note: to submit real work you would now:
    // 1. `let idx = queue.add_write_index_relaxed(1);`
    // 2. write a KERNEL_DISPATCH packet into `queue.slot_ptr(idx)`
    // 3. `queue.ring_doorbell(idx + 1);`

    println!("\n[+] Tearing down queue...");
    queue.destroy();
    println!("    Queue destroyed and all handlers confirmed DONE");

    Ok(())
}
