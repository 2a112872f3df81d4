use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use anyhow::{anyhow, Result};
use lazy_ir::ir::hashing::HashValue;
use lazy_ir::ir::{DType, IrContext, Node, OpKind, Operator, Shape, ShapeDescriptor, Value};
use lazy_ir::ops::{same_as_operand, DeviceData, Generic, ShapeRule};

const THREADS: usize = 8;

fn record(ctx: &IrContext) -> Result<(HashValue, Shape)> {
    let x = DeviceData::new(ctx, 1, Shape::from_static(DType::F32, &[16, 16]))?;
    let y = Generic::unary(ctx, OpKind::new("aten::tanh"), x.into())?;
    let z = Generic::unary(ctx, OpKind::new("aten::sigmoid"), y.into())?;
    Ok((z.hash(), z.graph_node().output_shape(0).clone()))
}

#[test]
fn threads_sharing_a_context_agree_on_hashes_and_shapes() -> Result<()> {
    let ctx = IrContext::default();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ctx = ctx.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                record(&ctx)
            })
        })
        .collect();

    let mut results = Vec::with_capacity(THREADS);
    for handle in handles {
        let result = handle
            .join()
            .map_err(|_| anyhow!("recording thread panicked"))??;
        results.push(result);
    }

    let (hash, shape) = &results[0];
    assert!(results.iter().all(|(h, s)| h == hash && s == shape));
    assert_eq!(shape, &Shape::from_static(DType::F32, &[16, 16]));
    // tanh and sigmoid; concurrent misses keep a single entry per key.
    assert_eq!(ctx.shape_cache().len(), 2);
    Ok(())
}

#[test]
fn shared_node_runs_its_closure_once() -> Result<()> {
    let ctx = IrContext::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let inner = same_as_operand(0);
    let rule: ShapeRule = Arc::new(move |operands: &[Value]| -> Result<ShapeDescriptor> {
        counted.fetch_add(1, Ordering::SeqCst);
        inner(operands)
    });
    let x = DeviceData::new(&ctx, 1, Shape::from_static(DType::F32, &[4]))?;
    let node = Generic::new(
        &ctx,
        OpKind::new("aten::erf"),
        vec![x.into()],
        rule,
        1,
        HashValue::default(),
    )?;
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let node = Arc::clone(&node);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                node.graph_node().output_shape(0).rank()
            })
        })
        .collect();

    for handle in handles {
        let rank = handle
            .join()
            .map_err(|_| anyhow!("resolving thread panicked"))?;
        assert_eq!(rank, 1);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}
