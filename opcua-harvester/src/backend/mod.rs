pub mod opc_ua;
