use ethosu::arch::{COEFS_REGION, SCRATCH_REGION};
use ethosu::cmd::regs::cmd0;
use ethosu::cmd::CommandReader;
use ethosu::graph::{Layout, Operation};
use ethosu::utils::dump::{dump_path, words_to_bytes};
use ethosu::{Compiler, CompilerOptions, Graph};
use serde_json::json;

fn fm(tensor_index: u32, height: u32, width: u32, depth: u32) -> serde_json::Value {
  json!({
    "tensor_index": tensor_index,
    "shape": { "height": height, "width": width, "depth": depth },
  })
}

/// conv 1x1 -> max pool 2x2 -> add, with weights for the convolution only.
fn graph() -> Graph {
  let weights: Vec<u32> = (0..256).map(|i| 100 + (i * 7) % 57).collect();
  let biases = vec![7i64; 16];
  let value = json!({
    "operations": [
      {
        "type": "convolution",
        "ifm": fm(0, 8, 8, 16),
        "ofm": fm(1, 8, 8, 16),
      },
      {
        "type": "pooling",
        "ifm": fm(1, 8, 8, 16),
        "ofm": fm(2, 4, 4, 16),
        "kernel": { "height": 2, "width": 2, "stride_x": 2, "stride_y": 2 },
      },
      {
        "type": "elementwise",
        "ifm": fm(2, 4, 4, 16),
        "ifm2": fm(3, 4, 4, 16),
        "ofm": fm(4, 4, 4, 16),
      },
    ],
    "coefficients": {
      "0": {
        "weights": { "shape": [16, 1, 1, 16], "values": weights, "zero_point": 128 },
        "biases": biases,
      },
    },
  });
  serde_json::from_value(value).unwrap()
}

fn op_codes(words: &[u32]) -> Vec<u32> {
  CommandReader::new(words)
    .filter(|cmd| !cmd.long && cmd.name().starts_with("NPU_OP_"))
    .map(|cmd| cmd.opcode)
    .collect()
}

#[test]
fn test_compile_graph() {
  let compiled = Compiler::new(CompilerOptions::default()).compile(graph()).unwrap();

  assert_eq!(compiled.operations.len(), 4);
  let Operation::Dma { address, size } = compiled.operations[0] else {
    panic!("expected a DMA in front of the convolution");
  };
  assert_eq!(address, 0);
  assert_eq!(size as usize, compiled.coefs.len());

  let Operation::Convolution { common, weights, scales, .. } = &compiled.operations[1] else {
    panic!("expected a convolution");
  };
  assert_eq!(scales.region, SCRATCH_REGION);
  assert_eq!(scales.address, 0);
  assert_eq!(scales.size, 160);
  assert_eq!(weights.region, SCRATCH_REGION);
  assert_eq!(weights.address, 160);
  assert_eq!(common.ifm.layout, Layout::Nhwc);
  assert_eq!(common.ofm.layout, Layout::Nhcwb16);
  assert_eq!(common.ofm.base_address(), 1024);

  let add = compiled.operations[3].common().unwrap();
  assert_eq!(add.ifm.layout, Layout::Nhcwb16);
  assert_eq!(compiled.operations[3].ifm2().unwrap().base_address(), 2304);
  assert_eq!(add.ofm.layout, Layout::Nhwc);
  assert_eq!(compiled.io_size, 2816);

  assert!(compiled.operations[1..].iter().all(|op| op.block_config().is_some()));
  assert_eq!(
    op_codes(&compiled.cmdstream),
    vec![
      cmd0::NPU_OP_DMA_START,
      cmd0::NPU_OP_DMA_WAIT,
      cmd0::NPU_OP_CONV,
      cmd0::NPU_OP_POOL,
      cmd0::NPU_OP_ELEMENTWISE,
      cmd0::NPU_OP_STOP,
    ]
  );
}

#[test]
fn test_compile_without_staging() {
  let options = CompilerOptions::from_toml("disable_sram = true\ndisable_nhcwb16 = true\n").unwrap();
  let compiled = Compiler::new(options).compile(graph()).unwrap();

  assert_eq!(compiled.operations.len(), 3);
  let Operation::Convolution { common, weights, .. } = &compiled.operations[0] else {
    panic!("expected a convolution");
  };
  assert_eq!(weights.region, COEFS_REGION);
  assert_eq!(common.ofm.layout, Layout::Nhwc);
  assert!(!op_codes(&compiled.cmdstream).contains(&cmd0::NPU_OP_DMA_WAIT));
}

#[test]
fn test_compiled_operations_serialize() {
  let compiled = Compiler::new(CompilerOptions::default()).compile(graph()).unwrap();
  let text = serde_json::to_string(&compiled.operations).unwrap();
  assert!(text.contains("\"type\":\"dma\""));
  let operations: Vec<Operation> = serde_json::from_str(&text).unwrap();
  assert_eq!(operations, compiled.operations);
}

#[test]
fn test_preassigned_addresses_are_kept() {
  let mut graph = graph();
  graph.addresses_assigned = true;
  graph.coefficients.clear();
  let compiled = Compiler::new(CompilerOptions::default()).compile(graph).unwrap();
  assert_eq!(compiled.io_size, 0);
  assert!(compiled.coefs.is_empty());
  assert_eq!(compiled.operations.len(), 3);
  assert!(compiled.operations.iter().all(|op| op.common().unwrap().ofm.base_address() == 0));
}

#[test]
fn test_dump_buffers() {
  let dir = std::env::temp_dir().join(format!("ethosu-dump-{}", std::process::id()));
  let options = CompilerOptions {
    dump_buffers: true,
    dump_dir: dir.clone(),
    ..CompilerOptions::default()
  };
  let compiled = Compiler::new(options).compile(graph()).unwrap();

  let cmdstream = std::fs::read(dump_path(&dir, "cmdstream", 0, 0)).unwrap();
  let coefs = std::fs::read(dump_path(&dir, "coefs", 0, 0)).unwrap();
  std::fs::remove_dir_all(&dir).unwrap();
  assert_eq!(cmdstream, words_to_bytes(&compiled.cmdstream));
  assert_eq!(coefs, compiled.coefs);
}
