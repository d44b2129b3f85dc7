// Kernel Emission Demo
// Builds a vector-scale kernel graph by hand, emits its source, and sizes a launch

use loft_core::codegen::writer::{KernelParam, KernelPrototype};
use loft_core::codegen::KernelModule;
use loft_core::ir::graph::{GraphBuilder, LoopInfo};
use loft_core::ir::op::{AddressCast, BinaryOp, Expr, MemoryAccess, Op, Value};
use loft_core::ir::types::{AddressSpace, ConstValue, KernelType};
use loft_core::runtime::{
    BufferId, CpuScheduler, DeviceLimits, KernelScheduler, ResidencyTable, TaskMetadata,
};

fn main() {
    // scale(data, alpha, n): data[i] = data[i] * alpha for i in 0..n
    let mut b = GraphBuilder::new();
    let b0 = b.entry();
    let header = b.create_block();
    let body = b.create_block();
    let exit = b.create_block();

    b.set_dominator(header, b0).expect("wiring failed");
    b.set_dominator(body, header).expect("wiring failed");
    b.set_dominator(exit, header).expect("wiring failed");
    b.add_successor(b0, header).expect("wiring failed");
    b.add_successor(header, body).expect("wiring failed");
    b.add_successor(header, exit).expect("wiring failed");
    b.add_successor(body, header).expect("wiring failed");

    let data = b.add_var(KernelType::ULONG);
    let alpha = b.add_var(KernelType::FLOAT);
    let n = b.add_var(KernelType::INT);
    let i = b.add_var(KernelType::INT);
    let inext = b.add_var(KernelType::INT);
    let t = b.add_var(KernelType::FLOAT);

    b.push_op(b0, Op::Assign { dst: i, src: Value::Const(ConstValue::Int(0)) })
        .expect("push failed");

    b.push_op(header, Op::LoopInit).expect("push failed");
    b.push_op(
        header,
        Op::Assign {
            dst: inext,
            src: Expr::Binary {
                op: BinaryOp::Add,
                lhs: Value::Var(i),
                rhs: Value::Const(ConstValue::Int(1)),
            }
            .into(),
        },
    )
    .expect("push failed");
    b.push_op(header, Op::LoopPost).expect("push failed");
    b.push_op(
        header,
        Op::LoopCondition {
            cond: Expr::Binary { op: BinaryOp::Lt, lhs: Value::Var(i), rhs: Value::Var(n) }
                .into(),
        },
    )
    .expect("push failed");

    let float_cast = AddressCast::new(AddressSpace::Global, KernelType::FLOAT);
    b.push_op(
        body,
        Op::Load { dst: t, cast: float_cast, access: MemoryAccess::with_offset(data, i) },
    )
    .expect("push failed");
    b.push_op(
        body,
        Op::Store {
            cast: float_cast,
            access: MemoryAccess::with_offset(data, i),
            src: Expr::Binary { op: BinaryOp::Mul, lhs: Value::Var(alpha), rhs: Value::Var(t) }
                .into(),
        },
    )
    .expect("push failed");
    b.push_op(body, Op::Move { dst: i, src: Value::Var(inext) }).expect("push failed");

    b.mark_loop_header(
        header,
        LoopInfo { exits: vec![exit], blocks: vec![header, body], back_edges: vec![body] },
    )
    .expect("wiring failed");
    b.mark_loop_end(body).expect("wiring failed");
    b.mark_merge(header).expect("wiring failed");

    let graph = b.finish().expect("graph construction failed");
    let prototype = KernelPrototype::new(
        "scale",
        vec![
            KernelParam::pointer("data", data, KernelType::FLOAT, AddressSpace::Global),
            KernelParam::value("alpha", alpha, KernelType::FLOAT),
            KernelParam::value("n", n, KernelType::INT),
        ],
    );

    let mut module = KernelModule { prototype, graph };
    let source = module.emit().expect("emission failed");

    println!("=== Emitted Kernel ===\n");
    for (index, line) in source.lines().enumerate() {
        println!("{:3} | {}", index + 1, line);
    }
    println!();

    // Size a launch for the kernel on an 8-unit CPU-class device
    let limits = DeviceLimits { max_compute_units: 8, max_work_item_sizes: [1024, 1, 1] };
    let task = TaskMetadata::new(&[1_000_000]);
    let sizes = CpuScheduler::new(1.0).compute_work_sizes(&task, &limits);

    println!("=== Launch Geometry ===\n");
    println!("Iteration domain: {:?}", task.domain());
    println!("Global work:      {:?}", sizes.global);
    println!("Local work:       {:?} (driver picks)", sizes.local);
    println!();

    // Track where the data buffer lives after a device-side write
    let table = ResidencyTable::new();
    let buf = BufferId(1);
    {
        let mut tracker = table.buffer(buf);
        tracker.set_owner(loft_core::runtime::DeviceId(0));
        let state = tracker.owner_state().expect("owner was just set");
        state.allocated = true;
        state.valid = true;
    }

    println!("=== Residency ===\n");
    print!("{}", table.dump());
}
