use encoding_rs::Encoding;
use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use markup5ever_rcdom::{Handle, RcDom, SerializableHandle};

/// 序列化文档
///
/// `document_encoding` 为空或无法识别时输出 UTF-8。
pub fn serialize_document(dom: &RcDom, document_encoding: &str) -> Vec<u8> {
    let buf = serialize_handle(&dom.document, TraversalScope::IncludeNode);

    if !document_encoding.is_empty() {
        if let Some(encoding) = Encoding::for_label(document_encoding.as_bytes()) {
            let s: &str = &String::from_utf8_lossy(&buf);
            let (data, _, _) = encoding.encode(s);
            return data.to_vec();
        }
    }

    buf
}

/// 节点自身及其子树的 HTML
pub fn outer_html(node: &Handle) -> String {
    String::from_utf8_lossy(&serialize_handle(node, TraversalScope::IncludeNode)).into_owned()
}

/// 节点子树的 HTML（不含节点自身）
pub fn inner_html(node: &Handle) -> String {
    String::from_utf8_lossy(&serialize_handle(node, TraversalScope::ChildrenOnly(None)))
        .into_owned()
}

fn serialize_handle(node: &Handle, traversal_scope: TraversalScope) -> Vec<u8> {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = node.clone().into();
    let opts = SerializeOpts {
        traversal_scope,
        ..Default::default()
    };
    // 写入内存缓冲区只会在节点数据本身异常时失败，此时返回已写出的部分
    if let Err(e) = serialize(&mut buf, &serializable, opts) {
        tracing::warn!("DOM 序列化失败: {}", e);
    }
    buf
}
